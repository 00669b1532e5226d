use super::types::*;
use crate::utils::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, warn};

const SYNC_CHANNEL_CAPACITY: usize = 64;

/// Versioned key-value store kept in sync with remote replicas.
///
/// `set` is optimistic: the caller passes the version it last observed and the
/// store answers with the authoritative record after the write.
#[async_trait::async_trait]
pub trait ReplicatedKvStore: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<RawRecord>, ReplicaError>;
	async fn set(&self, key: &str, value: Vec<u8>, local_version: u64) -> Result<RawRecord, ReplicaError>;
	/// Receives the key of every record updated by a remote sync.
	fn subscribe_synced(&self) -> broadcast::Receiver<String>;
}

/// Load and decode the object stored under `T::KEY`. Tombstoned records read as absent.
pub async fn load_object<T: KvObject>(
	store: &dyn ReplicatedKvStore,
) -> Result<Option<VersionedRecord<T>>, ReplicaError> {
	let Some(raw) = store.get(T::KEY).await? else {
		return Ok(None);
	};
	if raw.deleted {
		debug!("Replica record {} is deleted", T::KEY);
		return Ok(None);
	}
	let value: T = serde_json::from_slice(&raw.value)?;
	Ok(Some(raw.map(|_| value)))
}

/// Encode and write `value` under `T::KEY`, returning the record the store reports back.
pub async fn save_object<T: KvObject>(
	store: &dyn ReplicatedKvStore,
	value: &T,
	local_version: u64,
) -> Result<VersionedRecord<T>, ReplicaError> {
	let bytes = serde_json::to_vec(value)?;
	let raw = store.set(T::KEY, bytes, local_version).await?;
	let stored: T = serde_json::from_slice(&raw.value)?;
	Ok(raw.map(|_| stored))
}

fn validate_key(key: &str) -> Result<(), ReplicaError> {
	let valid = !key.is_empty()
		&& !key.starts_with('.')
		&& key
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
	if valid {
		Ok(())
	} else {
		Err(ReplicaError::InvalidKey(key.to_string()))
	}
}

/// Process-local store, used by tests and as a stand-in when no replica is configured.
pub struct InMemoryKvStore {
	records: Mutex<HashMap<String, RawRecord>>,
	synced: broadcast::Sender<String>,
}

impl Default for InMemoryKvStore {
	fn default() -> Self {
		Self::new()
	}
}

impl InMemoryKvStore {
	pub fn new() -> Self {
		let (synced, _) = broadcast::channel(SYNC_CHANNEL_CAPACITY);
		Self {
			records: Mutex::new(HashMap::new()),
			synced,
		}
	}

	/// Install a record as if it had arrived from another replica, then notify subscribers.
	pub async fn apply_remote(&self, key: &str, value: Vec<u8>, version: u64) {
		let record = RawRecord {
			key: key.to_string(),
			version,
			last_modified: Utc::now(),
			deleted: false,
			value,
		};
		self.records.lock().await.insert(key.to_string(), record);
		self.notify_synced(key);
	}

	pub fn notify_synced(&self, key: &str) {
		// No receivers is fine
		let _ = self.synced.send(key.to_string());
	}
}

#[async_trait::async_trait]
impl ReplicatedKvStore for InMemoryKvStore {
	async fn get(&self, key: &str) -> Result<Option<RawRecord>, ReplicaError> {
		validate_key(key)?;
		Ok(self.records.lock().await.get(key).cloned())
	}

	async fn set(&self, key: &str, value: Vec<u8>, local_version: u64) -> Result<RawRecord, ReplicaError> {
		validate_key(key)?;
		let mut records = self.records.lock().await;
		let current = records.get(key).map(|r| r.version).unwrap_or(0);
		let record = RawRecord {
			key: key.to_string(),
			version: current.max(local_version) + 1,
			last_modified: Utc::now(),
			deleted: false,
			value,
		};
		records.insert(key.to_string(), record.clone());
		Ok(record)
	}

	fn subscribe_synced(&self) -> broadcast::Receiver<String> {
		self.synced.subscribe()
	}
}

/// On-disk envelope for one record.
#[derive(Serialize, Deserialize)]
struct StoredRecord {
	version: u64,
	last_modified: DateTime<Utc>,
	#[serde(default)]
	deleted: bool,
	/// Hex encoded value bytes.
	value: String,
}

/// File-based implementation of ReplicatedKvStore, one JSON file per key.
pub struct FileKvStore {
	data_dir: PathBuf,
	write_lock: Mutex<()>,
	synced: broadcast::Sender<String>,
}

impl FileKvStore {
	pub fn new(data_dir: PathBuf) -> Self {
		let (synced, _) = broadcast::channel(SYNC_CHANNEL_CAPACITY);
		Self {
			data_dir,
			write_lock: Mutex::new(()),
			synced,
		}
	}

	fn get_record_filename(&self, key: &str) -> PathBuf {
		self.data_dir.join(format!("{}.kv.json", key))
	}

	/// Signal that `key` was updated externally (for example by a replication process).
	pub fn notify_synced(&self, key: &str) {
		let _ = self.synced.send(key.to_string());
	}

	async fn read_record(&self, key: &str) -> Result<Option<RawRecord>, ReplicaError> {
		let filename = self.get_record_filename(key);
		let content = match tokio::fs::read_to_string(&filename).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		let stored: StoredRecord = serde_json::from_str(&content)?;
		let value = hex::decode(&stored.value)
			.map_err(|e| ReplicaError::Encoding(format!("Failed to decode record {}: {}", key, e)))?;
		Ok(Some(RawRecord {
			key: key.to_string(),
			version: stored.version,
			last_modified: stored.last_modified,
			deleted: stored.deleted,
			value,
		}))
	}
}

#[async_trait::async_trait]
impl ReplicatedKvStore for FileKvStore {
	async fn get(&self, key: &str) -> Result<Option<RawRecord>, ReplicaError> {
		validate_key(key)?;
		self.read_record(key).await
	}

	async fn set(&self, key: &str, value: Vec<u8>, local_version: u64) -> Result<RawRecord, ReplicaError> {
		validate_key(key)?;
		let _guard = self.write_lock.lock().await;

		let current = match self.read_record(key).await {
			Ok(record) => record.map(|r| r.version).unwrap_or(0),
			Err(e) => {
				warn!("Replacing unreadable replica record {}: {}", key, e);
				0
			}
		};
		let record = RawRecord {
			key: key.to_string(),
			version: current.max(local_version) + 1,
			last_modified: Utc::now(),
			deleted: false,
			value,
		};

		let stored = StoredRecord {
			version: record.version,
			last_modified: record.last_modified,
			deleted: false,
			value: hex::encode(&record.value),
		};
		let content = serde_json::to_vec_pretty(&stored)?;
		write_atomic(&self.get_record_filename(key), &content).await?;

		debug!("Saved replica record {} at version {}", key, record.version);
		Ok(record)
	}

	fn subscribe_synced(&self) -> broadcast::Receiver<String> {
		self.synced.subscribe()
	}
}
