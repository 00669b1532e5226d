//! Types for the currency catalog: metadata entries, identifiers and errors

use crate::config::NetworkClass;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Globally unique currency identifier, e.g. `ethereum-mainnet:__native__`
/// or `ethereum-mainnet:0x558ec3...` for tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyId(String);

impl CurrencyId {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Network id portion of the uid (everything before the first `:`).
    pub fn network_id(&self) -> &str {
        self.0.split(':').next().unwrap_or(&self.0)
    }

    pub fn is_native(&self) -> bool {
        self.0.ends_with(":__native__")
    }
}

impl fmt::Display for CurrencyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CurrencyId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CurrencyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// How a currency is represented on its network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// The network's own currency
    Native,
    /// An ERC-20 contract on an Ethereum network
    Erc20,
    Unknown,
}

/// Catalog entry describing one currency.
///
/// Two entries are equal when their uids are equal; the remaining fields are
/// descriptive and may change between catalog refreshes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyMetaData {
    #[serde(rename = "currency_id")]
    pub uid: CurrencyId,
    pub code: String,
    pub name: String,
    pub is_supported: bool,
    /// Gradient start and end colors as hex strings.
    #[serde(default)]
    pub colors: Vec<String>,
    /// Token contract address; `None` for native currencies.
    #[serde(rename = "contract_address", default)]
    pub token_address: Option<String>,
    #[serde(rename = "scale")]
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_names: Option<HashMap<String, String>>,
}

impl CurrencyMetaData {
    /// Natively supported currencies are listed before everything else.
    pub fn is_preferred(&self) -> bool {
        Currencies::ALL.iter().any(|c| {
            c.uid(NetworkClass::Mainnet) == self.uid
                || c.uid(NetworkClass::Testnet) == self.uid
        })
    }

    pub fn token_type(&self) -> TokenType {
        if self.uid.is_native() {
            TokenType::Native
        } else if self.token_address.is_some() {
            TokenType::Erc20
        } else {
            TokenType::Unknown
        }
    }

    /// Code used by third party price services, when it differs from `code`.
    pub fn alternate_code(&self) -> Option<&str> {
        self.alternate_names
            .as_ref()
            .and_then(|names| names.get("cryptocompare"))
            .map(String::as_str)
    }

    /// True if `address` is this entry's token contract, compared case-insensitively.
    pub fn has_token_address(&self, address: &str) -> bool {
        self.token_address
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(address))
    }
}

impl PartialEq for CurrencyMetaData {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for CurrencyMetaData {}

impl Hash for CurrencyMetaData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
    }
}

/// Natively supported currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currencies {
    Btc,
    Bch,
    Eth,
    Brd,
    Tusd,
}

impl Currencies {
    pub const ALL: [Currencies; 5] = [
        Currencies::Btc,
        Currencies::Bch,
        Currencies::Eth,
        Currencies::Brd,
        Currencies::Tusd,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Currencies::Btc => "btc",
            Currencies::Bch => "bch",
            Currencies::Eth => "eth",
            Currencies::Brd => "brd",
            Currencies::Tusd => "tusd",
        }
    }

    pub fn uid(&self, class: NetworkClass) -> CurrencyId {
        let uid = match (self, class) {
            (Currencies::Btc, NetworkClass::Mainnet) => "bitcoin-mainnet:__native__",
            (Currencies::Btc, NetworkClass::Testnet) => "bitcoin-testnet:__native__",
            (Currencies::Bch, NetworkClass::Mainnet) => "bitcoincash-mainnet:__native__",
            (Currencies::Bch, NetworkClass::Testnet) => "bitcoincash-testnet:__native__",
            (Currencies::Eth, NetworkClass::Mainnet) => "ethereum-mainnet:__native__",
            (Currencies::Eth, NetworkClass::Testnet) => "ethereum-ropsten:__native__",
            (Currencies::Brd, NetworkClass::Mainnet) => {
                "ethereum-mainnet:0x558ec3152e2eb2174905cd19aea4e34a23de9ad6"
            }
            (Currencies::Brd, NetworkClass::Testnet) => {
                "ethereum-ropsten:0x7108ca7c4718efa810457f228305c9c71390931a"
            }
            (Currencies::Tusd, _) => "ethereum-mainnet:0x0000000000085d4780B73119b644AE5ecd22b376",
        };
        CurrencyId::from(uid)
    }
}

/// In-memory catalog keyed by uid.
#[derive(Debug, Clone, Default)]
pub struct CurrencyCatalog {
    entries: HashMap<CurrencyId, CurrencyMetaData>,
}

impl CurrencyCatalog {
    pub fn from_entries(entries: impl IntoIterator<Item = CurrencyMetaData>) -> Self {
        Self {
            entries: entries.into_iter().map(|m| (m.uid.clone(), m)).collect(),
        }
    }

    pub fn get(&self, uid: &CurrencyId) -> Option<&CurrencyMetaData> {
        self.entries.get(uid)
    }

    pub fn contains(&self, uid: &CurrencyId) -> bool {
        self.entries.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CurrencyMetaData> {
        self.entries.values()
    }

    /// All entries whose code matches, compared in lowercase.
    pub fn by_code(&self, code: &str) -> Vec<&CurrencyMetaData> {
        let code = code.to_lowercase();
        self.entries
            .values()
            .filter(|m| m.code.to_lowercase() == code)
            .collect()
    }

    pub fn token_by_address(&self, address: &str) -> Option<&CurrencyMetaData> {
        self.entries.values().find(|m| m.has_token_address(address))
    }

    /// Merge a freshly fetched entry list into this catalog.
    ///
    /// Fetched entries replace existing ones. Entries the fetch no longer lists are
    /// kept but marked unsupported.
    pub fn merge_additive(&mut self, fetched: Vec<CurrencyMetaData>) {
        let fetched: HashMap<CurrencyId, CurrencyMetaData> =
            fetched.into_iter().map(|m| (m.uid.clone(), m)).collect();
        for (uid, entry) in self.entries.iter_mut() {
            if !fetched.contains_key(uid) {
                entry.is_supported = false;
            }
        }
        self.entries.extend(fetched);
    }

    /// The subset of entries living on networks of `class`.
    pub fn for_network_class(&self, class: NetworkClass) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(uid, _)| class.matches_network_id(uid.network_id()))
                .map(|(uid, m)| (uid.clone(), m.clone()))
                .collect(),
        }
    }

    /// Entries in a stable order, for serialization.
    pub fn to_sorted_vec(&self) -> Vec<CurrencyMetaData> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.uid.cmp(&b.uid));
        entries
    }
}

/// Error types for catalog fetching and caching
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("No currency catalog available: {0}")]
    NoCatalog(String),
}
