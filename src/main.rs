use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use wallet_sync_core::asset::AssetCollection;
use wallet_sync_core::catalog::{CatalogClient, CurrencyMetadataCache};
use wallet_sync_core::config::SyncCoreConfig;
use wallet_sync_core::replica::{FileKvStore, ReplicatedKvStore};
use wallet_sync_core::wallet::WalletConnectionSettings;

const DEFAULT_CONFIG_PATH: &str = "wallet-sync.json";

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	let config_path = std::env::args()
		.nth(1)
		.map(PathBuf::from)
		.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

	let config = if config_path.exists() {
		match SyncCoreConfig::load(&config_path) {
			Ok(config) => config,
			Err(e) => {
				error!("Failed to load config: {}", e);
				return;
			}
		}
	} else {
		warn!("{} not found, using default configuration", config_path.display());
		SyncCoreConfig::default()
	};

	info!(
		"Starting wallet sync core ({:?}, data in {})",
		config.network_class,
		config.data_dir.display()
	);

	let base_url = config.catalog.base_url.clone();
	let client = match CatalogClient::new(base_url, config.catalog.request_timeout()) {
		Ok(client) => client,
		Err(e) => {
			error!("Failed to create catalog client: {}", e);
			return;
		}
	};

	let cache = CurrencyMetadataCache::new(
		Arc::new(client),
		config.catalog_cache_path(),
		config.catalog.cache_max_age(),
		config.catalog.max_fetch_elapsed(),
	);

	let catalog = match cache.refresh().await {
		Ok(catalog) => catalog,
		Err(e) => {
			error!("Failed to load currency catalog: {}", e);
			return;
		}
	};
	info!("Loaded {} catalog entries", catalog.len());

	let store: Arc<dyn ReplicatedKvStore> = Arc::new(FileKvStore::new(config.replica_dir()));

	let collection = AssetCollection::load(store.clone(), catalog, config.network_class).await;
	info!(
		"Enabled assets: {}",
		collection
			.enabled_assets()
			.iter()
			.map(|a| a.code.to_uppercase())
			.collect::<Vec<_>>()
			.join(", ")
	);
	info!(
		"Available assets: {}",
		collection
			.available_assets()
			.iter()
			.map(|a| a.code.to_uppercase())
			.collect::<Vec<_>>()
			.join(", ")
	);

	let settings = WalletConnectionSettings::load(store).await;
	for asset in collection.enabled_assets().iter().filter(|a| a.uid.is_native()) {
		match settings.stored_mode(&asset.uid) {
			Some(mode) => info!("{} connection mode: {}", asset.code.to_uppercase(), mode),
			None => info!(
				"{} connection mode: {} (default)",
				asset.code.to_uppercase(),
				WalletConnectionSettings::default_mode(&asset.uid)
			),
		}
	}
}
