//! Currency catalog
//!
//! Static metadata for every currency the application knows about, fetched from
//! the catalog service and cached on disk with a bundled fallback.

/// Disk cache with bundled fallback
mod cache;
/// HTTP client for the catalog service
mod client;
/// Catalog entry types and errors
mod types;

pub use cache::{BUNDLED_CATALOG, CurrencyMetadataCache, bundled_catalog};
pub use client::{CatalogClient, CatalogSource};
pub use types::*;
