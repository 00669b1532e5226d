//! Runtime configuration for the sync core.
//!
//! Every field has a default so a partial JSON file (or none at all) yields a usable
//! configuration. Paths derived from `data_dir` are exposed as helper methods so the
//! registry, the catalog cache and the file replica agree on the on-disk layout.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which family of networks the application runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkClass {
	#[default]
	Mainnet,
	Testnet,
}

impl NetworkClass {
	pub fn is_mainnet(&self) -> bool {
		matches!(self, NetworkClass::Mainnet)
	}

	/// True if a network id such as `ethereum-ropsten` belongs to this class.
	pub fn matches_network_id(&self, network_id: &str) -> bool {
		let suffixes: &[&str] = match self {
			NetworkClass::Mainnet => &["-mainnet"],
			NetworkClass::Testnet => &["-testnet", "-ropsten"],
		};
		suffixes.iter().any(|s| network_id.ends_with(s))
	}
}

/// Settings for the remote currency catalog and its local cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
	/// Base URL of the catalog service; `/currency-metadata` is appended.
	pub base_url: String,
	/// Timeout applied to each HTTP request.
	pub request_timeout_secs: u64,
	/// Upper bound on time spent retrying a failed fetch before falling back to the cache.
	pub max_fetch_elapsed_secs: u64,
	/// A pre-existing cache younger than this is used without a network fetch.
	pub cache_max_age_secs: Option<u64>,
	/// File name of the catalog cache inside `data_dir`.
	pub cache_file_name: String,
}

impl Default for CatalogConfig {
	fn default() -> Self {
		Self {
			base_url: "https://api.breadwallet.com".to_string(),
			request_timeout_secs: 30,
			max_fetch_elapsed_secs: 10,
			cache_max_age_secs: Some(60 * 60),
			cache_file_name: "currencies.json".to_string(),
		}
	}
}

impl CatalogConfig {
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn max_fetch_elapsed(&self) -> Duration {
		Duration::from_secs(self.max_fetch_elapsed_secs)
	}

	pub fn cache_max_age(&self) -> Option<Duration> {
		self.cache_max_age_secs.map(Duration::from_secs)
	}
}

/// Top level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncCoreConfig {
	pub network_class: NetworkClass,
	/// Root directory for the engine database, catalog cache and file replica.
	pub data_dir: PathBuf,
	/// Network ids the engine is started for on `connect`.
	pub required_networks: Vec<String>,
	pub catalog: CatalogConfig,
}

impl Default for SyncCoreConfig {
	fn default() -> Self {
		Self {
			network_class: NetworkClass::Mainnet,
			data_dir: PathBuf::from("./wallet-data"),
			required_networks: vec![
				"bitcoin-mainnet".to_string(),
				"bitcoincash-mainnet".to_string(),
				"ethereum-mainnet".to_string(),
			],
			catalog: CatalogConfig::default(),
		}
	}
}

impl SyncCoreConfig {
	/// Load a configuration file. Missing fields fall back to their defaults.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
			path: path.to_path_buf(),
			source: e,
		})?;
		let config: SyncCoreConfig = serde_json::from_str(&content)?;
		config.validate()?;
		Ok(config)
	}

	/// Reject configurations whose required networks belong to the other network class.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.required_networks.is_empty() {
			return Err(ConfigError::Invalid(
				"at least one required network must be configured".to_string(),
			));
		}
		if let Some(network) = self
			.required_networks
			.iter()
			.find(|id| !self.network_class.matches_network_id(id))
		{
			return Err(ConfigError::Invalid(format!(
				"network {} does not match network class {:?}",
				network, self.network_class
			)));
		}
		Ok(())
	}

	/// Directory handed to the engine for its own persistence.
	pub fn core_data_dir(&self) -> PathBuf {
		self.data_dir.join("core")
	}

	pub fn catalog_cache_path(&self) -> PathBuf {
		self.data_dir.join(&self.catalog.cache_file_name)
	}

	pub fn replica_dir(&self) -> PathBuf {
		self.data_dir.join("kv")
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Failed to read config file {path:?}: {source}")]
	Read {
		path: PathBuf,
		source: std::io::Error,
	},

	#[error("Config parse error: {0}")]
	Parse(#[from] serde_json::Error),

	#[error("Invalid config: {0}")]
	Invalid(String),
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn partial_file_falls_back_to_defaults() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(
			&path,
			r#"{
				"network_class": "testnet",
				"required_networks": ["bitcoin-testnet"],
				"catalog": { "request_timeout_secs": 5 }
			}"#,
		)
		.unwrap();

		let config = SyncCoreConfig::load(&path).unwrap();
		assert_eq!(config.network_class, NetworkClass::Testnet);
		assert_eq!(config.catalog.request_timeout(), Duration::from_secs(5));
		assert_eq!(config.catalog.cache_file_name, "currencies.json");
		assert_eq!(config.catalog_cache_path(), config.data_dir.join("currencies.json"));
	}

	#[test]
	fn mismatched_network_class_is_rejected() {
		let config = SyncCoreConfig {
			network_class: NetworkClass::Testnet,
			..SyncCoreConfig::default()
		};
		assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
	}
}
