//! Blockchain engine boundary
//!
//! The engine owns validation, cryptography and peer networking. This crate only
//! drives it through the traits below and consumes the events it emits.

pub mod events;
mod types;

pub use events::*;
pub use types::*;

use crate::catalog::CurrencyId;
use crate::registry::EngineEventSender;
use std::path::Path;
use std::sync::Arc;

/// Creates engine sessions bound to an account.
pub trait EngineFactory: Send + Sync {
    fn create_system(
        &self,
        account: &Account,
        on_mainnet: bool,
        data_dir: &Path,
        events: EngineEventSender,
    ) -> Result<Arc<dyn BlockchainEngine>, EngineError>;
}

/// One engine session.
pub trait BlockchainEngine: Send + Sync {
    /// Begin discovering the given networks. Networks and managers are reported as events.
    fn start(&self, required_networks: &[String]);
    fn stop(&self);
    fn supports_mode(&self, network: &Network, mode: WalletManagerMode) -> bool;
    fn default_mode(&self, network: &Network) -> WalletManagerMode;
    /// Ask for a manager for `network`; it arrives later as `SystemEvent::ManagerAdded`.
    fn create_wallet_manager(
        &self,
        network: &Network,
        mode: WalletManagerMode,
        currencies: &[CurrencyId],
    ) -> Result<(), EngineError>;
}

/// Per-network wallet manager.
pub trait EngineManager: Send + Sync {
    fn network(&self) -> &Network;
    fn mode(&self) -> WalletManagerMode;
    fn set_mode(&self, mode: WalletManagerMode);
    fn state(&self) -> ManagerState;
    fn connect(&self);
    fn disconnect(&self);
    fn sync_to_depth(&self, depth: SyncDepth);
    fn submit(&self, wallet: &dyn EngineWallet, transfer: &Transfer, secret: &[u8]);
}

/// Per-currency wallet inside a manager.
pub trait EngineWallet: Send + Sync {
    fn currency(&self) -> &EngineCurrency;
    fn balance(&self) -> Amount;
    fn transfers(&self) -> Vec<Transfer>;
    /// Receive address.
    fn target(&self) -> Address;
    /// Parse and validate an address for this wallet's network.
    fn address_for(&self, address: &str) -> Option<Address>;
    fn create_transfer(
        &self,
        target: &Address,
        amount: &Amount,
        fee_basis: &TransferFeeBasis,
    ) -> Option<Transfer>;
}
