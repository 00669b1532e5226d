mod currency;
mod manager;
mod progress;
mod queue;
mod types;
mod wallet_registry;

pub use currency::Currency;
pub use manager::ManagerAdapter;
pub use progress::{SyncProgressTracker, SyncStats};
pub use queue::{
    EngineEventSender, QueueMessage, RegistryCommand, RegistryHandle, RegistrySnapshot,
    spawn_registry,
};
pub use types::*;
pub use wallet_registry::WalletRegistry;
