//!
//! HTTP client for the currency catalog service.
//!
//! The catalog is a plain JSON array served at `{base_url}/currency-metadata`.
//! Fetching is abstracted behind [`CatalogSource`] so the cache can be driven by
//! a stub in tests.

use super::types::*;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Anything that can produce the current list of catalog entries.
#[async_trait]
pub trait CatalogSource: Send + Sync {
	async fn fetch_currency_metadata(&self) -> Result<Vec<CurrencyMetaData>, CatalogError>;
}

/// Catalog service client
#[derive(Clone)]
pub struct CatalogClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the catalog service, without trailing slash.
	base_url: String,
}

impl CatalogClient {
	/// Create a new catalog client.
	///
	/// # Arguments
	/// * `base_url` - The service root; `/currency-metadata` is appended.
	/// * `timeout` - Applied to every request so a stalled fetch cannot block `connect`.
	pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
		let http_client = Client::builder().timeout(timeout).build()?;

		Ok(Self {
			http_client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
		})
	}

	fn metadata_url(&self) -> String {
		format!("{}/currency-metadata", self.base_url)
	}
}

#[async_trait]
impl CatalogSource for CatalogClient {
	async fn fetch_currency_metadata(&self) -> Result<Vec<CurrencyMetaData>, CatalogError> {
		let url = self.metadata_url();
		debug!("Fetching currency metadata from {}", url);

		let response = self
			.http_client
			.get(&url)
			.header("Accept", "application/json")
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(CatalogError::Status(response.status().as_u16()));
		}

		let entries: Vec<CurrencyMetaData> = response.json().await?;
		debug!("Fetched {} currency metadata entries", entries.len());
		Ok(entries)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn metadata_url_strips_trailing_slash() {
		let client = CatalogClient::new("https://example.test/", Duration::from_secs(1)).unwrap();
		assert_eq!(client.metadata_url(), "https://example.test/currency-metadata");
	}
}
