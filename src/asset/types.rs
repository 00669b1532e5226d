use crate::catalog::CurrencyId;

/// Rejected edits to the enabled asset list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetCollectionError {
	#[error("Asset already enabled: {0}")]
	AlreadyEnabled(CurrencyId),

	#[error("Asset not enabled: {0}")]
	NotEnabled(CurrencyId),

	#[error("Asset not in catalog: {0}")]
	UnknownAsset(CurrencyId),

	#[error("Index {index} out of bounds for {len} assets")]
	IndexOutOfBounds { index: usize, len: usize },
}

/// Result of reconciling the collection against a remote replica update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSyncOutcome {
	/// The replica holds nothing newer than the local baseline.
	Unchanged,
	/// The remote index replaced the local one.
	Replaced { discarded_local_edits: bool },
}
