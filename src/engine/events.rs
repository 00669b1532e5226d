//! Event system for engine notifications.
//!
//! The engine reports everything that happens to networks, managers, wallets and transfers as
//! [`EngineEvent`]s. Events are forwarded onto the registry queue and dispatched there, in order,
//! to a [`SystemListener`]. Per-currency wallet and transfer events are then routed on to the
//! owning [`WalletListener`].
//!
//! Handlers return errors instead of panicking; the queue decides which errors are fatal.

use super::types::*;
use super::{EngineManager, EngineWallet};
use crate::registry::RegistryError;
use std::fmt;
use std::sync::Arc;

/// Events about the engine session as a whole
pub enum SystemEvent {
    Created,
    /// A network was discovered
    NetworkAdded(Network),
    /// A manager requested with `create_wallet_manager` is ready
    ManagerAdded(Arc<dyn EngineManager>),
}

/// Events about one wallet manager
pub enum ManagerEvent {
    Created,
    Changed {
        old: ManagerState,
        new: ManagerState,
    },
    Deleted,
    WalletAdded(Arc<dyn EngineWallet>),
    WalletChanged(Arc<dyn EngineWallet>),
    WalletDeleted(Arc<dyn EngineWallet>),
    SyncStarted,
    SyncProgress {
        timestamp: Option<chrono::DateTime<chrono::Utc>>,
        percent: f64,
    },
    /// Sync finished; `error` is set when it stopped because of a failure
    SyncEnded { error: Option<String> },
    BlockUpdated(u64),
}

/// Events about one wallet
#[derive(Debug, Clone)]
pub enum WalletEvent {
    Created,
    Changed,
    Deleted,
    TransferAdded(Transfer),
    TransferChanged(Transfer),
    TransferDeleted(Transfer),
    /// Explicit result of a submission
    TransferSubmitted { transfer: Transfer, success: bool },
    BalanceUpdated(Amount),
    FeeBasisUpdated,
}

/// Events about one transfer
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Created,
    Changed {
        old: TransferState,
        new: TransferState,
    },
    Deleted,
}

/// Everything the engine can report, tagged with the objects it concerns
pub enum EngineEvent {
    System(SystemEvent),
    Manager {
        manager: Arc<dyn EngineManager>,
        event: ManagerEvent,
    },
    Wallet {
        manager: Arc<dyn EngineManager>,
        wallet: Arc<dyn EngineWallet>,
        event: WalletEvent,
    },
    Transfer {
        manager: Arc<dyn EngineManager>,
        wallet: Arc<dyn EngineWallet>,
        transfer: Transfer,
        event: TransferEvent,
    },
}

impl fmt::Display for SystemEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemEvent::Created => write!(f, "system created"),
            SystemEvent::NetworkAdded(network) => write!(f, "network added: {}", network),
            SystemEvent::ManagerAdded(manager) => write!(f, "manager added: {}", manager.network()),
        }
    }
}

impl fmt::Display for ManagerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerEvent::Created => write!(f, "created"),
            ManagerEvent::Changed { old, new } => write!(f, "changed {:?} -> {:?}", old, new),
            ManagerEvent::Deleted => write!(f, "deleted"),
            ManagerEvent::WalletAdded(w) => write!(f, "wallet added: {}", w.currency().uid),
            ManagerEvent::WalletChanged(w) => write!(f, "wallet changed: {}", w.currency().uid),
            ManagerEvent::WalletDeleted(w) => write!(f, "wallet deleted: {}", w.currency().uid),
            ManagerEvent::SyncStarted => write!(f, "sync started"),
            ManagerEvent::SyncProgress { percent, .. } => write!(f, "sync progress {:.1}%", percent),
            ManagerEvent::SyncEnded { error: None } => write!(f, "sync ended"),
            ManagerEvent::SyncEnded { error: Some(e) } => write!(f, "sync ended with error: {}", e),
            ManagerEvent::BlockUpdated(height) => write!(f, "block updated: {}", height),
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::System(event) => write!(f, "[system] {}", event),
            EngineEvent::Manager { manager, event } => {
                write!(f, "[manager {}] {}", manager.network(), event)
            }
            EngineEvent::Wallet { wallet, event, .. } => {
                write!(f, "[wallet {}] {:?}", wallet.currency().uid, event)
            }
            EngineEvent::Transfer {
                wallet,
                transfer,
                event,
                ..
            } => write!(
                f,
                "[transfer {} {}] {:?}",
                wallet.currency().uid,
                transfer.id,
                event
            ),
        }
    }
}

/// Receiver of all engine events, run on the registry queue.
#[async_trait::async_trait]
pub trait SystemListener: Send {
    async fn handle_system_event(&mut self, event: SystemEvent) -> Result<(), RegistryError>;

    async fn handle_manager_event(
        &mut self,
        manager: Arc<dyn EngineManager>,
        event: ManagerEvent,
    ) -> Result<(), RegistryError>;

    async fn handle_wallet_event(
        &mut self,
        manager: Arc<dyn EngineManager>,
        wallet: Arc<dyn EngineWallet>,
        event: WalletEvent,
    ) -> Result<(), RegistryError>;

    async fn handle_transfer_event(
        &mut self,
        manager: Arc<dyn EngineManager>,
        wallet: Arc<dyn EngineWallet>,
        transfer: Transfer,
        event: TransferEvent,
    ) -> Result<(), RegistryError>;

    /// Get the name of this listener for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Receiver of the events concerning a single wallet.
pub trait WalletListener {
    fn handle_wallet_event(&mut self, event: &WalletEvent);
    fn handle_transfer_event(&mut self, transfer: &Transfer, event: &TransferEvent);
}

/// Route an event to the matching listener method.
pub async fn dispatch_engine_event(
    listener: &mut dyn SystemListener,
    event: EngineEvent,
) -> Result<(), RegistryError> {
    match event {
        EngineEvent::System(event) => listener.handle_system_event(event).await,
        EngineEvent::Manager { manager, event } => {
            listener.handle_manager_event(manager, event).await
        }
        EngineEvent::Wallet {
            manager,
            wallet,
            event,
        } => listener.handle_wallet_event(manager, wallet, event).await,
        EngineEvent::Transfer {
            manager,
            wallet,
            transfer,
            event,
        } => {
            listener
                .handle_transfer_event(manager, wallet, transfer, event)
                .await
        }
    }
}
