use crate::catalog::{CurrencyCatalog, CurrencyId, Currencies};
use crate::config::NetworkClass;
use crate::replica::KvObject;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const ASSET_INDEX_CLASS_VERSION: u32 = 2;

/// Replica object holding the user's ordered list of enabled currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndex {
    pub class_version: u32,
    pub enabled_asset_ids: Vec<CurrencyId>,
}

impl KvObject for AssetIndex {
    const KEY: &'static str = "asset-index";
}

impl AssetIndex {
    pub fn new(enabled_asset_ids: Vec<CurrencyId>) -> Self {
        Self {
            class_version: ASSET_INDEX_CLASS_VERSION,
            enabled_asset_ids,
        }
    }

    pub fn with_defaults(class: NetworkClass) -> Self {
        Self::new(default_currency_ids(class))
    }
}

/// Currencies enabled for a fresh wallet.
pub fn default_currency_ids(class: NetworkClass) -> Vec<CurrencyId> {
    vec![
        Currencies::Btc.uid(class),
        Currencies::Eth.uid(class),
        Currencies::Brd.uid(class),
    ]
}

/// The index format used before uids existed; read only for migration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyAssetIndex {
    pub class_version: u32,
    pub enabled_currencies: Vec<String>,
    pub hidden_currencies: Vec<String>,
    pub does_require_save: u32,
}

impl KvObject for LegacyAssetIndex {
    const KEY: &'static str = "token-list-metadata-2";
}

const ERC20_PREFIXES: [&str; 2] = ["erc20:", "erc20_"];

/// Convert a legacy index into an [`AssetIndex`], dropping keys that no longer resolve.
pub fn migrate_legacy(
    legacy: &LegacyAssetIndex,
    catalog: &CurrencyCatalog,
    class: NetworkClass,
) -> AssetIndex {
    let mut migrated: Vec<CurrencyId> = Vec::with_capacity(legacy.enabled_currencies.len());
    for old_key in &legacy.enabled_currencies {
        match migrate_key(old_key, catalog, class) {
            Some(uid) if !migrated.contains(&uid) => migrated.push(uid),
            Some(_) => debug!("Skipping duplicate legacy key {}", old_key),
            None => warn!("Dropping unresolvable legacy asset key {}", old_key),
        }
    }
    AssetIndex::new(migrated)
}

fn migrate_key(old_key: &str, catalog: &CurrencyCatalog, class: NetworkClass) -> Option<CurrencyId> {
    let lower = old_key.to_lowercase();
    if let Some(address) = ERC20_PREFIXES.iter().find_map(|p| lower.strip_prefix(*p)) {
        return catalog.token_by_address(address).map(|m| m.uid.clone());
    }
    let native = match lower.as_str() {
        "btc" | "bitcoin" => Currencies::Btc,
        "bch" | "bitcoincash" => Currencies::Bch,
        "eth" | "ethereum" => Currencies::Eth,
        _ => return None,
    };
    let uid = native.uid(class);
    catalog.contains(&uid).then_some(uid)
}
