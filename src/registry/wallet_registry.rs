//! The wallet registry.
//!
//! `WalletRegistry` owns the engine session and everything derived from it: registered
//! currencies, one `ManagerAdapter` per network and one `WalletController` per currency.
//! It is driven from a single queue task (see `queue`), so commands and engine events are
//! handled one at a time in arrival order.

use super::currency::Currency;
use super::manager::ManagerAdapter;
use super::progress::SyncProgressTracker;
use super::queue::EngineEventSender;
use super::types::{InvariantViolation, LifecycleState, RegistryError};
use crate::catalog::{CurrencyCatalog, CurrencyId, CurrencyMetadataCache};
use crate::config::SyncCoreConfig;
use crate::engine::{
    Account, Amount, BlockchainEngine, EngineError, EngineEvent, EngineFactory, EngineManager,
    EngineWallet, ManagerEvent, Network, SyncDepth, SystemEvent, SystemListener, Transfer,
    TransferEvent, TransferFeeBasis, TransferId, WalletEvent, WalletListener,
    WalletManagerMode, dispatch_engine_event,
};
use crate::replica::{ReplicatedKvStore, SyncNotice};
use crate::state::{StateAction, StatePublisher, SyncState};
use crate::wallet::{SendOutcome, WalletConnectionSettings, WalletController};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub struct WalletRegistry {
    config: SyncCoreConfig,
    lifecycle: LifecycleState,
    engine_factory: Arc<dyn EngineFactory>,
    engine: Option<Arc<dyn BlockchainEngine>>,
    events: EngineEventSender,
    metadata_cache: CurrencyMetadataCache,
    store: Arc<dyn ReplicatedKvStore>,
    publisher: StatePublisher,

    catalog: CurrencyCatalog,
    currencies: HashMap<CurrencyId, Currency>,
    managers: HashMap<String, ManagerAdapter>,
    wallets: HashMap<CurrencyId, WalletController>,
    connection_settings: Option<WalletConnectionSettings>,
    progress: SyncProgressTracker,
}

impl WalletRegistry {
    pub fn new(
        config: SyncCoreConfig,
        engine_factory: Arc<dyn EngineFactory>,
        metadata_cache: CurrencyMetadataCache,
        store: Arc<dyn ReplicatedKvStore>,
        publisher: StatePublisher,
        events: EngineEventSender,
    ) -> Self {
        Self {
            config,
            lifecycle: LifecycleState::Uninitialized,
            engine_factory,
            engine: None,
            events,
            metadata_cache,
            store,
            publisher,
            catalog: CurrencyCatalog::default(),
            currencies: HashMap::new(),
            managers: HashMap::new(),
            wallets: HashMap::new(),
            connection_settings: None,
            progress: SyncProgressTracker::new(),
        }
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    pub fn config(&self) -> &SyncCoreConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CurrencyCatalog {
        &self.catalog
    }

    pub fn currency(&self, uid: &CurrencyId) -> Option<&Currency> {
        self.currencies.get(uid)
    }

    /// Registered currencies ordered by uid.
    pub fn currencies(&self) -> Vec<Currency> {
        let mut currencies: Vec<Currency> = self.currencies.values().cloned().collect();
        currencies.sort_by(|a, b| a.uid.cmp(&b.uid));
        currencies
    }

    pub fn manager(&self, network_id: &str) -> Option<&ManagerAdapter> {
        self.managers.get(network_id)
    }

    pub fn manager_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.managers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn wallet(&self, uid: &CurrencyId) -> Option<&WalletController> {
        self.wallets.get(uid)
    }

    pub fn wallet_ids(&self) -> Vec<CurrencyId> {
        let mut ids: Vec<CurrencyId> = self.wallets.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn progress(&self) -> &SyncProgressTracker {
        &self.progress
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: &[LifecycleState],
    ) -> Result<(), RegistryError> {
        if allowed.contains(&self.lifecycle) {
            Ok(())
        } else {
            Err(RegistryError::InvalidLifecycle {
                operation,
                state: self.lifecycle,
            })
        }
    }

    fn engine(&self, operation: &'static str) -> Result<Arc<dyn BlockchainEngine>, RegistryError> {
        self.engine
            .clone()
            .ok_or(RegistryError::InvalidLifecycle {
                operation,
                state: self.lifecycle,
            })
    }

    /// Create the engine session for `account`.
    pub async fn create(&mut self, account: Account) -> Result<(), RegistryError> {
        self.require("create", &[LifecycleState::Uninitialized])?;

        let data_dir = self.config.core_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        let engine = self.engine_factory.create_system(
            &account,
            self.config.network_class.is_mainnet(),
            &data_dir,
            self.events.clone(),
        )?;

        info!(
            "Created engine session in {} ({:?})",
            data_dir.display(),
            self.config.network_class
        );
        self.engine = Some(engine);
        self.lifecycle = LifecycleState::Idle;
        Ok(())
    }

    /// Refresh the catalog, load settings and start the engine.
    pub async fn connect(&mut self) -> Result<(), RegistryError> {
        self.require("connect", &[LifecycleState::Idle])?;
        let engine = self.engine("connect")?;

        self.catalog = self.metadata_cache.refresh().await?;
        info!("Currency catalog has {} entries", self.catalog.len());

        if self.connection_settings.is_none() {
            self.connection_settings =
                Some(WalletConnectionSettings::load(self.store.clone()).await);
        }

        // Networks retained from an earlier connect keep their manager and wallets.
        let undiscovered: Vec<String> = self
            .config
            .required_networks
            .iter()
            .filter(|id| !self.managers.contains_key(id.as_str()))
            .cloned()
            .collect();
        debug!(
            "Starting engine: {} networks to discover, {} retained",
            undiscovered.len(),
            self.managers.len()
        );
        engine.start(&undiscovered);
        for manager in self.managers.values() {
            manager.connect();
        }

        self.lifecycle = LifecycleState::Active;
        info!("Registry connected");
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<(), RegistryError> {
        self.require("disconnect", &[LifecycleState::Active])?;
        let engine = self.engine("disconnect")?;

        for manager in self.managers.values() {
            manager.disconnect();
        }
        engine.stop();

        self.lifecycle = LifecycleState::Idle;
        info!("Registry disconnected");
        Ok(())
    }

    /// Tear down the session and wipe the engine's data directory.
    pub async fn shutdown(&mut self) -> Result<(), RegistryError> {
        self.require("shutdown", &[LifecycleState::Idle, LifecycleState::Active])?;

        if let Some(engine) = self.engine.take() {
            engine.stop();
        }
        self.managers.clear();
        self.wallets.clear();
        self.currencies.clear();
        self.catalog = CurrencyCatalog::default();
        self.connection_settings = None;
        self.progress.clear();
        self.lifecycle = LifecycleState::Uninitialized;

        let data_dir = self.config.core_data_dir();
        match tokio::fs::remove_dir_all(&data_dir).await {
            Ok(()) => debug!("Removed {}", data_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Error removing {}: {}", data_dir.display(), e),
        }

        self.publisher.publish(StateAction::Reset);
        info!("Registry shut down");
        Ok(())
    }

    /// Switch a network's manager to `mode` and remember the choice.
    pub async fn set_connection_mode(
        &mut self,
        network_id: &str,
        mode: WalletManagerMode,
    ) -> Result<(), RegistryError> {
        self.require(
            "set connection mode",
            &[LifecycleState::Idle, LifecycleState::Active],
        )?;
        let engine = self.engine("set connection mode")?;
        let manager = self
            .managers
            .get(network_id)
            .ok_or_else(|| RegistryError::UnknownNetwork(network_id.to_string()))?;

        if !engine.supports_mode(manager.network(), mode) {
            return Err(EngineError::UnsupportedMode {
                network: network_id.to_string(),
                mode,
            }
            .into());
        }

        manager.switch_mode(mode, self.lifecycle == LifecycleState::Active);
        let native = manager.network().currency.clone();
        match self.connection_settings.as_mut() {
            Some(settings) => settings.set(mode, &native).await?,
            None => warn!("No connection settings loaded, {} not persisted", mode),
        }
        Ok(())
    }

    /// Resync `network_id` from `depth`.
    pub fn rescan(&mut self, network_id: &str, depth: SyncDepth) -> Result<(), RegistryError> {
        self.require("rescan", &[LifecycleState::Active])?;
        let manager = self
            .managers
            .get(network_id)
            .ok_or_else(|| RegistryError::UnknownNetwork(network_id.to_string()))?;

        manager.rescan(depth);
        for uid in self.network_currency_ids(network_id) {
            self.publisher.publish(StateAction::Rescanning {
                uid,
                is_rescanning: true,
            });
        }
        Ok(())
    }

    /// Connect managers whose network has an enabled currency and disconnect the rest.
    pub fn update_manager_connections(
        &mut self,
        enabled: &[CurrencyId],
    ) -> Result<(), RegistryError> {
        self.require("update manager connections", &[LifecycleState::Active])?;
        for manager in self.managers.values() {
            if enabled.iter().any(|uid| manager.handles(uid)) {
                manager.connect();
            } else {
                manager.disconnect();
            }
        }
        Ok(())
    }

    pub fn create_transfer(
        &self,
        uid: &CurrencyId,
        address: &str,
        amount: &Amount,
        fee_basis: &TransferFeeBasis,
    ) -> Result<Transfer, RegistryError> {
        let wallet = self
            .wallets
            .get(uid)
            .ok_or_else(|| RegistryError::UnknownWallet(uid.clone()))?;
        Ok(wallet.create_transfer(address, amount, fee_basis)?)
    }

    /// Submit `transfer` and return a receiver resolved once the engine reports the outcome.
    pub fn submit_transfer(
        &mut self,
        uid: &CurrencyId,
        transfer: &Transfer,
        secret: &[u8],
    ) -> Result<oneshot::Receiver<SendOutcome>, RegistryError> {
        let wallet = self
            .wallets
            .get_mut(uid)
            .ok_or_else(|| RegistryError::UnknownWallet(uid.clone()))?;
        let (tx, rx) = oneshot::channel();
        wallet.subscribe(transfer.id.clone(), tx)?;
        wallet.submit_transfer(transfer, secret);
        Ok(rx)
    }

    pub fn unsubscribe_send(
        &mut self,
        uid: &CurrencyId,
        transfer_id: &TransferId,
    ) -> Result<bool, RegistryError> {
        let wallet = self
            .wallets
            .get_mut(uid)
            .ok_or_else(|| RegistryError::UnknownWallet(uid.clone()))?;
        Ok(wallet.unsubscribe(transfer_id))
    }

    /// Reconcile connection settings after a remote replica sync. Managers whose adopted
    /// mode differs from the one they run in are switched.
    pub async fn handle_sync_notice(&mut self, notice: &SyncNotice) -> Result<(), RegistryError> {
        let Some(settings) = self.connection_settings.as_mut() else {
            debug!("No connection settings loaded, ignoring {:?}", notice);
            return Ok(());
        };
        if !settings.apply_sync_notice(notice).await? {
            return Ok(());
        }
        let Some(engine) = self.engine.as_ref() else {
            return Ok(());
        };

        let reconnect = self.lifecycle == LifecycleState::Active;
        for manager in self.managers.values() {
            let Some(mode) = settings.stored_mode(&manager.network().currency) else {
                continue;
            };
            if mode == manager.mode() {
                continue;
            }
            if engine.supports_mode(manager.network(), mode) {
                manager.switch_mode(mode, reconnect);
            } else {
                warn!("Remote mode {} unsupported for {}", mode, manager.network_id());
            }
        }
        Ok(())
    }

    /// Handle one engine event. Events from a torn-down session are dropped.
    pub async fn handle_engine_event(&mut self, event: EngineEvent) -> Result<(), RegistryError> {
        if self.lifecycle == LifecycleState::Uninitialized {
            debug!("Dropping stale engine event: {}", event);
            return Ok(());
        }
        dispatch_engine_event(self, event).await
    }

    fn network_currency_ids(&self, network_id: &str) -> Vec<CurrencyId> {
        self.currencies
            .values()
            .filter(|c| c.network_id == network_id)
            .map(|c| c.uid.clone())
            .collect()
    }

    fn publish_sync_state(&self, network_id: &str, state: SyncState) {
        for uid in self.network_currency_ids(network_id) {
            self.publisher
                .publish(StateAction::SyncStateChanged { uid, state });
        }
    }

    async fn add_network(&mut self, network: Network) -> Result<(), RegistryError> {
        if network.is_mainnet != self.config.network_class.is_mainnet() {
            debug!("Ignoring network {} of the other class", network);
            return Ok(());
        }
        let engine = self.engine("add network")?;

        let mut added = Vec::with_capacity(network.currencies.len());
        for core in &network.currencies {
            let metadata = self
                .catalog
                .get(&core.uid)
                .cloned()
                .ok_or_else(|| InvariantViolation::MissingMetadata(core.uid.clone()))?;
            if self.currencies.contains_key(&core.uid)
                || added.iter().any(|c: &Currency| c.uid == core.uid)
            {
                return Err(InvariantViolation::DuplicateCurrency(core.uid.clone()).into());
            }
            let currency = Currency::new(core, &network, metadata)
                .ok_or_else(|| InvariantViolation::MissingUnits(core.uid.clone()))?;
            added.push(currency);
        }

        let uids: Vec<CurrencyId> = added.iter().map(|c| c.uid.clone()).collect();
        for currency in added {
            self.currencies.insert(currency.uid.clone(), currency);
        }
        self.publisher
            .publish(StateAction::CurrenciesUpdated(self.currencies()));

        let mode = match self.connection_settings.as_mut() {
            Some(settings) => {
                settings
                    .mode(&network.currency, |m| engine.supports_mode(&network, m))
                    .await
            }
            None => engine.default_mode(&network),
        };
        let mode = if engine.supports_mode(&network, mode) {
            mode
        } else {
            let fallback = engine.default_mode(&network);
            warn!("Mode {} unsupported for {}, using {}", mode, network, fallback);
            fallback
        };

        info!("Network {} added with {} currencies, mode {}", network, uids.len(), mode);
        engine.create_wallet_manager(&network, mode, &uids)?;
        Ok(())
    }

    fn add_manager(&mut self, manager: Arc<dyn EngineManager>) -> Result<(), RegistryError> {
        let network_id = manager.network().id.clone();
        if self.managers.contains_key(&network_id) {
            return Err(InvariantViolation::DuplicateManager(network_id).into());
        }
        let adapter = ManagerAdapter::new(manager);
        if self.lifecycle == LifecycleState::Active {
            adapter.connect();
        }
        info!("Manager added for {} ({})", network_id, adapter.mode());
        self.managers.insert(network_id, adapter);
        Ok(())
    }

    fn add_wallet(
        &mut self,
        manager: Arc<dyn EngineManager>,
        wallet: Arc<dyn EngineWallet>,
    ) -> Result<(), RegistryError> {
        let uid = wallet.currency().uid.clone();
        if self.wallets.contains_key(&uid) {
            return Err(InvariantViolation::DuplicateController(uid).into());
        }
        let currency = self
            .currencies
            .get(&uid)
            .cloned()
            .ok_or_else(|| InvariantViolation::UnknownCurrency(uid.clone()))?;

        let controller = WalletController::new(currency, wallet, manager, self.publisher.clone());
        self.publisher.publish(StateAction::WalletAdded {
            currency: controller.currency().clone(),
            balance: controller.balance(),
            transfers: controller.transfers(),
        });
        info!("Wallet added for {}", uid);
        self.wallets.insert(uid, controller);
        Ok(())
    }

    fn remove_wallet(&mut self, wallet: Arc<dyn EngineWallet>) -> Result<(), RegistryError> {
        let uid = wallet.currency().uid.clone();
        if self.wallets.remove(&uid).is_none() {
            return Err(InvariantViolation::MissingController(uid).into());
        }
        info!("Wallet removed for {}", uid);
        self.publisher.publish(StateAction::WalletRemoved(uid));
        Ok(())
    }

    fn controller_for(
        &mut self,
        wallet: &Arc<dyn EngineWallet>,
    ) -> Result<&mut WalletController, RegistryError> {
        let uid = &wallet.currency().uid;
        self.wallets
            .get_mut(uid)
            .ok_or_else(|| InvariantViolation::UnknownCurrency(uid.clone()).into())
    }
}

#[async_trait::async_trait]
impl SystemListener for WalletRegistry {
    async fn handle_system_event(&mut self, event: SystemEvent) -> Result<(), RegistryError> {
        match event {
            SystemEvent::Created => {
                debug!("Engine session created");
                Ok(())
            }
            SystemEvent::NetworkAdded(network) => self.add_network(network).await,
            SystemEvent::ManagerAdded(manager) => self.add_manager(manager),
        }
    }

    async fn handle_manager_event(
        &mut self,
        manager: Arc<dyn EngineManager>,
        event: ManagerEvent,
    ) -> Result<(), RegistryError> {
        let network_id = manager.network().id.clone();
        match event {
            ManagerEvent::WalletAdded(wallet) => self.add_wallet(manager, wallet)?,
            ManagerEvent::WalletDeleted(wallet) => self.remove_wallet(wallet)?,
            ManagerEvent::SyncStarted => {
                self.progress.record_started(&network_id);
                self.publish_sync_state(&network_id, SyncState::Syncing);
            }
            ManagerEvent::SyncProgress { timestamp, percent } => {
                self.progress.record_progress(&network_id, percent, timestamp);
                for uid in self.network_currency_ids(&network_id) {
                    self.publisher.publish(StateAction::SyncProgress {
                        uid,
                        percent,
                        timestamp,
                    });
                }
            }
            ManagerEvent::SyncEnded { error } => {
                self.progress.record_ended(&network_id, error.as_deref());
                let state = match error {
                    None => SyncState::Success,
                    Some(_) => SyncState::Connecting,
                };
                self.publish_sync_state(&network_id, state);
            }
            ManagerEvent::BlockUpdated(height) => self.progress.record_block(&network_id, height),
            ManagerEvent::Changed { old, new } => {
                debug!("Manager {} changed {:?} -> {:?}", network_id, old, new)
            }
            ManagerEvent::Created | ManagerEvent::Deleted | ManagerEvent::WalletChanged(_) => {
                debug!("Manager {}: {}", network_id, event)
            }
        }
        Ok(())
    }

    async fn handle_wallet_event(
        &mut self,
        _manager: Arc<dyn EngineManager>,
        wallet: Arc<dyn EngineWallet>,
        event: WalletEvent,
    ) -> Result<(), RegistryError> {
        match event {
            WalletEvent::Created | WalletEvent::Changed | WalletEvent::Deleted => {
                debug!("Wallet {}: {:?}", wallet.currency().uid, event);
                Ok(())
            }
            event => {
                self.controller_for(&wallet)?.handle_wallet_event(&event);
                Ok(())
            }
        }
    }

    async fn handle_transfer_event(
        &mut self,
        _manager: Arc<dyn EngineManager>,
        wallet: Arc<dyn EngineWallet>,
        transfer: Transfer,
        event: TransferEvent,
    ) -> Result<(), RegistryError> {
        self.controller_for(&wallet)?
            .handle_transfer_event(&transfer, &event);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "WalletRegistry"
    }
}
