use super::store::ReplicatedKvStore;
use tokio::sync::broadcast;
use tracing::warn;

/// One "replica synced" notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
	/// A remote sync updated this key.
	Key(String),
	/// Notifications were dropped; any key may have changed.
	Lagged(u64),
}

impl SyncNotice {
	pub fn touches(&self, key: &str) -> bool {
		match self {
			SyncNotice::Key(k) => k == key,
			SyncNotice::Lagged(_) => true,
		}
	}
}

/// Wraps the store's synced broadcast so a slow consumer reconciles everything
/// instead of missing an update.
pub struct ReplicaSyncListener {
	rx: broadcast::Receiver<String>,
}

impl ReplicaSyncListener {
	pub fn new(store: &dyn ReplicatedKvStore) -> Self {
		Self {
			rx: store.subscribe_synced(),
		}
	}

	/// The next notification, or `None` once the store is gone.
	pub async fn next(&mut self) -> Option<SyncNotice> {
		match self.rx.recv().await {
			Ok(key) => Some(SyncNotice::Key(key)),
			Err(broadcast::error::RecvError::Lagged(missed)) => {
				warn!("Missed {} replica sync notifications", missed);
				Some(SyncNotice::Lagged(missed))
			}
			Err(broadcast::error::RecvError::Closed) => None,
		}
	}
}
