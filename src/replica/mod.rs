//! Replicated, versioned key-value storage for user configuration records.

mod listener;
mod store;
mod types;

pub use listener::{ReplicaSyncListener, SyncNotice};
pub use store::{FileKvStore, InMemoryKvStore, ReplicatedKvStore, load_object, save_object};
pub use types::*;
