use crate::catalog::CurrencyId;
use crate::engine::{EngineManager, ManagerState, Network, SyncDepth, WalletManagerMode};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry-side facade over one engine wallet manager.
#[derive(Clone)]
pub struct ManagerAdapter {
	core: Arc<dyn EngineManager>,
}

impl ManagerAdapter {
	pub fn new(core: Arc<dyn EngineManager>) -> Self {
		Self { core }
	}

	pub fn core(&self) -> &Arc<dyn EngineManager> {
		&self.core
	}

	pub fn network(&self) -> &Network {
		self.core.network()
	}

	pub fn network_id(&self) -> &str {
		&self.core.network().id
	}

	/// True if `uid` is one of the currencies of this manager's network.
	pub fn handles(&self, uid: &CurrencyId) -> bool {
		self.network().currencies.iter().any(|c| &c.uid == uid)
	}

	pub fn mode(&self) -> WalletManagerMode {
		self.core.mode()
	}

	pub fn state(&self) -> ManagerState {
		self.core.state()
	}

	pub fn connect(&self) {
		debug!("Connecting manager {}", self.network_id());
		self.core.connect();
	}

	pub fn disconnect(&self) {
		debug!("Disconnecting manager {}", self.network_id());
		self.core.disconnect();
	}

	/// Switch modes while disconnected, reconnecting afterwards when `reconnect` is set.
	pub fn switch_mode(&self, mode: WalletManagerMode, reconnect: bool) {
		info!("Switching {} from {} to {}", self.network_id(), self.mode(), mode);
		self.core.disconnect();
		self.core.set_mode(mode);
		if reconnect {
			self.core.connect();
		}
	}

	pub fn rescan(&self, depth: SyncDepth) {
		info!("Rescanning {} ({:?})", self.network_id(), depth);
		self.core.connect();
		self.core.sync_to_depth(depth);
	}
}
