//! The user's enabled assets: the replicated index, its legacy predecessor and the
//! editable collection built on top of them.

mod collection;
mod index;
mod types;

pub use collection::AssetCollection;
pub use index::{
    ASSET_INDEX_CLASS_VERSION, AssetIndex, LegacyAssetIndex, default_currency_ids, migrate_legacy,
};
pub use types::*;
