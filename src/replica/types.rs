//! Types for the replicated key-value store

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};

/// A value as stored in the replica together with its replication metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord<T> {
    pub key: String,
    /// Replica version; 0 means never persisted.
    pub version: u64,
    pub last_modified: DateTime<Utc>,
    /// Tombstone flag set by a remote delete.
    pub deleted: bool,
    pub value: T,
}

impl<T> VersionedRecord<T> {
    /// A record that exists only in memory.
    pub fn new_unsaved(key: impl Into<String>, value: T) -> Self {
        Self {
            key: key.into(),
            version: 0,
            last_modified: Utc::now(),
            deleted: false,
            value,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> VersionedRecord<U> {
        VersionedRecord {
            key: self.key,
            version: self.version,
            last_modified: self.last_modified,
            deleted: self.deleted,
            value: f(self.value),
        }
    }
}

/// Raw bytes as held by a store implementation.
pub type RawRecord = VersionedRecord<Vec<u8>>;

/// A typed object persisted under a fixed replica key.
pub trait KvObject: Serialize + DeserializeOwned + Send + Sync {
    const KEY: &'static str;
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Replica unavailable: {0}")]
    Unavailable(String),
}
