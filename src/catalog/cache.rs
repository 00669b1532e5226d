//! On-disk cache in front of the catalog service.
//!
//! The cache file holds the last known catalog as a JSON array. A catalog bundled
//! into the binary seeds the cache on first run and is the last resort when both
//! the network and the cache file are unusable.

use super::client::CatalogSource;
use super::types::*;
use crate::utils::write_atomic;
use backoff::{ExponentialBackoff, future::retry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Catalog shipped with the crate.
pub const BUNDLED_CATALOG: &str = include_str!("../../assets/currencies.json");

/// Parse the bundled catalog.
pub fn bundled_catalog() -> Result<CurrencyCatalog, CatalogError> {
	let entries: Vec<CurrencyMetaData> = serde_json::from_str(BUNDLED_CATALOG)?;
	Ok(CurrencyCatalog::from_entries(entries))
}

pub struct CurrencyMetadataCache {
	source: Arc<dyn CatalogSource>,
	cache_path: PathBuf,
	/// A pre-existing cache younger than this skips the network.
	max_age: Option<Duration>,
	/// Total time allowed for retrying a failed fetch.
	max_fetch_elapsed: Duration,
}

impl CurrencyMetadataCache {
	pub fn new(
		source: Arc<dyn CatalogSource>,
		cache_path: PathBuf,
		max_age: Option<Duration>,
		max_fetch_elapsed: Duration,
	) -> Self {
		Self {
			source,
			cache_path,
			max_age,
			max_fetch_elapsed,
		}
	}

	pub fn cache_path(&self) -> &Path {
		&self.cache_path
	}

	/// Produce the current catalog, preferring fresh data and degrading to the cache,
	/// then to the bundled catalog.
	pub async fn refresh(&self) -> Result<CurrencyCatalog, CatalogError> {
		let pre_existing = tokio::fs::try_exists(&self.cache_path).await.unwrap_or(false);

		if !pre_existing {
			if let Err(e) = write_atomic(&self.cache_path, BUNDLED_CATALOG.as_bytes()).await {
				warn!("Failed to install bundled catalog at {:?}: {}", self.cache_path, e);
			}
		} else if self.is_fresh().await {
			match self.read_cache().await {
				Ok(catalog) => {
					debug!("Using fresh catalog cache ({} entries)", catalog.len());
					return Ok(catalog);
				}
				Err(e) => warn!("Catalog cache unreadable, refetching: {}", e),
			}
		}

		match self.fetch_with_retry().await {
			Ok(fetched) => {
				let mut catalog = self.read_cache().await.unwrap_or_default();
				catalog.merge_additive(fetched);
				if let Err(e) = self.write_cache(&catalog).await {
					warn!("Failed to write catalog cache: {}", e);
				}
				info!("Currency catalog refreshed: {} entries", catalog.len());
				Ok(catalog)
			}
			Err(e) => {
				warn!("Currency metadata fetch failed, falling back to cache: {}", e);
				self.fallback().await
			}
		}
	}

	async fn fallback(&self) -> Result<CurrencyCatalog, CatalogError> {
		match self.read_cache().await {
			Ok(catalog) => return Ok(catalog),
			Err(e) => warn!("Catalog cache {:?} unreadable: {}", self.cache_path, e),
		}
		bundled_catalog()
			.map_err(|e| CatalogError::NoCatalog(format!("bundled catalog invalid: {}", e)))
	}

	async fn fetch_with_retry(&self) -> Result<Vec<CurrencyMetaData>, CatalogError> {
		let policy = ExponentialBackoff {
			initial_interval: Duration::from_millis(200),
			max_interval: Duration::from_secs(2),
			max_elapsed_time: Some(self.max_fetch_elapsed),
			..Default::default()
		};

		retry(policy, || async {
			match self.source.fetch_currency_metadata().await {
				Ok(entries) => Ok(entries),
				Err(e) if is_retryable(&e) => {
					debug!("Retryable catalog fetch error: {}", e);
					Err(backoff::Error::transient(e))
				}
				Err(e) => Err(backoff::Error::permanent(e)),
			}
		})
		.await
	}

	async fn is_fresh(&self) -> bool {
		let Some(max_age) = self.max_age else {
			return false;
		};
		let modified = match tokio::fs::metadata(&self.cache_path).await {
			Ok(meta) => meta.modified(),
			Err(_) => return false,
		};
		modified
			.ok()
			.and_then(|m| SystemTime::now().duration_since(m).ok())
			.is_some_and(|age| age < max_age)
	}

	async fn read_cache(&self) -> Result<CurrencyCatalog, CatalogError> {
		let content = tokio::fs::read(&self.cache_path).await?;
		let entries: Vec<CurrencyMetaData> = serde_json::from_slice(&content)?;
		Ok(CurrencyCatalog::from_entries(entries))
	}

	async fn write_cache(&self, catalog: &CurrencyCatalog) -> Result<(), CatalogError> {
		let content = serde_json::to_vec_pretty(&catalog.to_sorted_vec())?;
		write_atomic(&self.cache_path, &content).await?;
		Ok(())
	}
}

fn is_retryable(error: &CatalogError) -> bool {
	match error {
		CatalogError::HttpError(_) => true,
		CatalogError::Status(code) => *code >= 500 || *code == 429,
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::catalog::Currencies;
	use crate::config::NetworkClass;
	use crate::test_support::StubCatalogSource;
	use tempfile::tempdir;

	fn cache(source: StubCatalogSource, path: PathBuf, max_age: Option<Duration>) -> CurrencyMetadataCache {
		CurrencyMetadataCache::new(Arc::new(source), path, max_age, Duration::from_secs(5))
	}

	#[test]
	fn bundled_catalog_contains_native_currencies() {
		let catalog = bundled_catalog().unwrap();
		for class in [NetworkClass::Mainnet, NetworkClass::Testnet] {
			assert!(catalog.contains(&Currencies::Btc.uid(class)));
			assert!(catalog.contains(&Currencies::Eth.uid(class)));
		}
	}

	#[tokio::test]
	async fn fetch_failure_without_cache_uses_bundled_catalog() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("currencies.json");
		let source = StubCatalogSource::failing();

		let catalog = cache(source.clone(), path.clone(), None).refresh().await.unwrap();

		assert!(catalog.contains(&Currencies::Btc.uid(NetworkClass::Mainnet)));
		assert!(catalog.contains(&Currencies::Eth.uid(NetworkClass::Mainnet)));
		assert!(path.exists());
		assert_eq!(source.calls(), 1);
	}

	#[tokio::test]
	async fn unwritable_cache_still_yields_bundled_catalog() {
		let dir = tempdir().unwrap();
		let blocker = dir.path().join("blocker");
		std::fs::write(&blocker, b"not a directory").unwrap();

		let catalog = cache(StubCatalogSource::failing(), blocker.join("currencies.json"), None)
			.refresh()
			.await
			.unwrap();

		assert!(catalog.contains(&Currencies::Btc.uid(NetworkClass::Mainnet)));
	}

	#[tokio::test]
	async fn successful_fetch_merges_and_persists() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("currencies.json");
		let fetched = vec![crate::test_support::metadata("bitcoin-mainnet:__native__", "btc", None, 8)];

		let catalog = cache(StubCatalogSource::returning(fetched), path.clone(), None)
			.refresh()
			.await
			.unwrap();

		let btc = catalog.get(&Currencies::Btc.uid(NetworkClass::Mainnet)).unwrap();
		assert!(btc.is_supported);
		let eth = catalog.get(&Currencies::Eth.uid(NetworkClass::Mainnet)).unwrap();
		assert!(!eth.is_supported);

		let persisted: Vec<CurrencyMetaData> =
			serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
		assert_eq!(persisted.len(), catalog.len());
	}

	#[tokio::test]
	async fn fresh_cache_skips_the_network() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("currencies.json");
		std::fs::write(&path, BUNDLED_CATALOG).unwrap();
		let source = StubCatalogSource::failing();

		let catalog = cache(source.clone(), path, Some(Duration::from_secs(3600)))
			.refresh()
			.await
			.unwrap();

		assert_eq!(source.calls(), 0);
		assert!(!catalog.is_empty());
	}

	#[tokio::test]
	async fn transient_errors_are_retried() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("currencies.json");
		let fetched = vec![crate::test_support::metadata("bitcoin-mainnet:__native__", "btc", None, 8)];
		let source = StubCatalogSource::flaky(1, fetched);

		cache(source.clone(), path, None).refresh().await.unwrap();

		assert_eq!(source.calls(), 2);
	}
}
