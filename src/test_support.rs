//! Fixtures and mocks shared by the unit tests.

use crate::catalog::{CatalogError, CatalogSource, CurrencyId, CurrencyMetaData, TokenType};
use crate::engine::{
    Account, Address, Amount, BlockchainEngine, CurrencyUnits, EngineCurrency, EngineError,
    EngineEvent, EngineFactory, EngineManager, EngineWallet, ManagerEvent, ManagerState, Network,
    SyncDepth, SystemEvent, Transfer, TransferDirection, TransferFeeBasis, TransferId,
    TransferState, Unit, WalletManagerMode,
};
use crate::registry::{Currency, EngineEventSender};
use crate::replica::{InMemoryKvStore, KvObject, RawRecord, ReplicaError, ReplicatedKvStore};
use crate::wallet::WalletConnectionInfo;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub const BTC_UID: &str = "bitcoin-mainnet:__native__";
pub const ETH_UID: &str = "ethereum-mainnet:__native__";
pub const BRD_UID: &str = "ethereum-mainnet:0x558ec3152e2eb2174905cd19aea4e34a23de9ad6";

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

pub fn metadata(uid: &str, code: &str, address: Option<&str>, decimals: u8) -> CurrencyMetaData {
    CurrencyMetaData {
        uid: CurrencyId::from(uid),
        code: code.to_string(),
        name: code.to_uppercase(),
        is_supported: true,
        colors: vec![],
        token_address: address.map(str::to_string),
        decimals,
        alternate_names: None,
    }
}

#[derive(Clone)]
enum StubBehaviour {
    Failing,
    Returning(Vec<CurrencyMetaData>),
    Flaky {
        failures: usize,
        entries: Vec<CurrencyMetaData>,
    },
}

/// Catalog source with canned answers. Clones share the call counter.
#[derive(Clone)]
pub struct StubCatalogSource {
    behaviour: StubBehaviour,
    calls: Arc<AtomicUsize>,
}

impl StubCatalogSource {
    fn with(behaviour: StubBehaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always fails with a non-retryable error.
    pub fn failing() -> Self {
        Self::with(StubBehaviour::Failing)
    }

    pub fn returning(entries: Vec<CurrencyMetaData>) -> Self {
        Self::with(StubBehaviour::Returning(entries))
    }

    /// Fails `failures` times with a retryable error, then succeeds.
    pub fn flaky(failures: usize, entries: Vec<CurrencyMetaData>) -> Self {
        Self::with(StubBehaviour::Flaky { failures, entries })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CatalogSource for StubCatalogSource {
    async fn fetch_currency_metadata(&self) -> Result<Vec<CurrencyMetaData>, CatalogError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            StubBehaviour::Failing => Err(CatalogError::Status(404)),
            StubBehaviour::Returning(entries) => Ok(entries.clone()),
            StubBehaviour::Flaky { failures, entries } => {
                if call < *failures {
                    Err(CatalogError::Status(503))
                } else {
                    Ok(entries.clone())
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Replica
// ---------------------------------------------------------------------------

/// A store whose every read and write fails.
pub struct FailingKvStore;

#[async_trait::async_trait]
impl ReplicatedKvStore for FailingKvStore {
    async fn get(&self, _key: &str) -> Result<Option<RawRecord>, ReplicaError> {
        Err(ReplicaError::Unavailable("offline".into()))
    }

    async fn set(
        &self,
        _key: &str,
        _value: Vec<u8>,
        _local_version: u64,
    ) -> Result<RawRecord, ReplicaError> {
        Err(ReplicaError::Unavailable("offline".into()))
    }

    fn subscribe_synced(&self) -> broadcast::Receiver<String> {
        broadcast::channel(1).1
    }
}

/// A store that answers each `set` with the next scripted version, whatever was asked for.
pub struct ScriptedKvStore {
    versions: Mutex<Vec<u64>>,
    records: Mutex<HashMap<String, RawRecord>>,
    synced: broadcast::Sender<String>,
}

impl ScriptedKvStore {
    pub fn new(versions: Vec<u64>) -> Self {
        let mut versions = versions;
        versions.reverse();
        Self {
            versions: Mutex::new(versions),
            records: Mutex::new(HashMap::new()),
            synced: broadcast::channel(8).0,
        }
    }
}

#[async_trait::async_trait]
impl ReplicatedKvStore for ScriptedKvStore {
    async fn get(&self, key: &str) -> Result<Option<RawRecord>, ReplicaError> {
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        local_version: u64,
    ) -> Result<RawRecord, ReplicaError> {
        let version = self
            .versions
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(local_version + 1);
        let record = RawRecord {
            key: key.to_string(),
            version,
            last_modified: Utc::now(),
            deleted: false,
            value,
        };
        self.records
            .lock()
            .unwrap()
            .insert(key.to_string(), record.clone());
        Ok(record)
    }

    fn subscribe_synced(&self) -> broadcast::Receiver<String> {
        self.synced.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Engine fixtures
// ---------------------------------------------------------------------------

fn unit(name: &str, symbol: &str, decimals: u8) -> Unit {
    Unit {
        name: name.to_string(),
        symbol: symbol.to_string(),
        decimals,
    }
}

fn units(base: Unit, default: Unit) -> CurrencyUnits {
    CurrencyUnits {
        all: vec![base.clone(), default.clone()],
        base,
        default,
    }
}

fn engine_currency(uid: &str, code: &str, name: &str, token_type: TokenType) -> EngineCurrency {
    EngineCurrency {
        uid: CurrencyId::from(uid),
        code: code.to_string(),
        name: name.to_string(),
        token_type,
    }
}

/// Install a `wallet-info` record as if another device had written it.
pub async fn put_remote_mode(
    store: &InMemoryKvStore,
    uid: &str,
    mode: WalletManagerMode,
    version: u64,
) {
    let info = WalletConnectionInfo {
        connection_modes: HashMap::from([(CurrencyId::from(uid), mode.serialization())]),
        ..WalletConnectionInfo::default()
    };
    let bytes = serde_json::to_vec(&info).unwrap();
    store.apply_remote(WalletConnectionInfo::KEY, bytes, version).await;
}

pub fn bitcoin_network() -> Network {
    let btc = CurrencyId::from(BTC_UID);
    Network {
        id: "bitcoin-mainnet".into(),
        name: "Bitcoin".into(),
        is_mainnet: true,
        currency: btc.clone(),
        currencies: vec![engine_currency(BTC_UID, "btc", "Bitcoin", TokenType::Native)],
        units: HashMap::from([(
            btc,
            units(unit("sat", "sat", 0), unit("bitcoin", "BTC", 8)),
        )]),
    }
}

pub fn ethereum_network() -> Network {
    let eth = CurrencyId::from(ETH_UID);
    Network {
        id: "ethereum-mainnet".into(),
        name: "Ethereum".into(),
        is_mainnet: true,
        currency: eth.clone(),
        currencies: vec![
            engine_currency(ETH_UID, "eth", "Ethereum", TokenType::Native),
            engine_currency(BRD_UID, "brd", "BRD Token", TokenType::Erc20),
        ],
        units: HashMap::from([
            (eth, units(unit("wei", "wei", 0), unit("ether", "ETH", 18))),
            (
                CurrencyId::from(BRD_UID),
                units(unit("brdi", "brdi", 0), unit("brd", "BRD", 18)),
            ),
        ]),
    }
}

pub fn bitcoin_currency() -> Currency {
    let network = bitcoin_network();
    Currency::new(&network.currencies[0], &network, metadata(BTC_UID, "btc", None, 8))
        .expect("bitcoin fixture is consistent")
}

pub fn transfer(
    id: &str,
    state: TransferState,
    direction: TransferDirection,
    timestamp: Option<DateTime<Utc>>,
) -> Transfer {
    Transfer {
        id: TransferId(id.to_string()),
        hash: None,
        state,
        direction,
        amount: Amount::zero(CurrencyId::from(BTC_UID)),
        timestamp,
        target: Address("addr-1".into()),
    }
}

// ---------------------------------------------------------------------------
// Engine mocks
// ---------------------------------------------------------------------------

pub struct MockWallet {
    currency: EngineCurrency,
    transfers: Mutex<Vec<Transfer>>,
    reject_amounts: AtomicBool,
    created: AtomicUsize,
}

impl MockWallet {
    pub fn new(uid: CurrencyId) -> Self {
        let token_type = if uid.is_native() {
            TokenType::Native
        } else {
            TokenType::Erc20
        };
        let code = uid.network_id().split('-').next().unwrap_or("x").to_string();
        Self::for_currency(EngineCurrency {
            name: code.clone(),
            uid,
            code,
            token_type,
        })
    }

    pub fn for_currency(currency: EngineCurrency) -> Self {
        Self {
            currency,
            transfers: Mutex::new(vec![]),
            reject_amounts: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        }
    }

    /// Make `create_transfer` refuse every amount.
    pub fn reject_amounts(&self) {
        self.reject_amounts.store(true, Ordering::SeqCst);
    }

    pub fn push_transfer(&self, transfer: Transfer) {
        self.transfers.lock().unwrap().push(transfer);
    }
}

impl EngineWallet for MockWallet {
    fn currency(&self) -> &EngineCurrency {
        &self.currency
    }

    fn balance(&self) -> Amount {
        Amount::zero(self.currency.uid.clone())
    }

    fn transfers(&self) -> Vec<Transfer> {
        self.transfers.lock().unwrap().clone()
    }

    fn target(&self) -> Address {
        Address("addr-receive".into())
    }

    fn address_for(&self, address: &str) -> Option<Address> {
        (address != "bogus").then(|| Address(address.to_string()))
    }

    fn create_transfer(
        &self,
        target: &Address,
        amount: &Amount,
        _fee_basis: &TransferFeeBasis,
    ) -> Option<Transfer> {
        if self.reject_amounts.load(Ordering::SeqCst) {
            return None;
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Some(Transfer {
            id: TransferId(format!("{}-tx-{}", self.currency.code, n)),
            hash: None,
            state: TransferState::Signed,
            direction: TransferDirection::Sent,
            amount: amount.clone(),
            timestamp: None,
            target: target.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerCommand {
    Connect,
    Disconnect,
    SetMode(WalletManagerMode),
    SyncToDepth(SyncDepth),
    Submit(TransferId),
}

pub struct MockManager {
    network: Network,
    mode: Mutex<WalletManagerMode>,
    state: Mutex<ManagerState>,
    commands: Mutex<Vec<ManagerCommand>>,
}

impl MockManager {
    pub fn new(network: Network) -> Self {
        Self::with_mode(network, WalletManagerMode::ApiOnly)
    }

    pub fn with_mode(network: Network, mode: WalletManagerMode) -> Self {
        Self {
            network,
            mode: Mutex::new(mode),
            state: Mutex::new(ManagerState::Created),
            commands: Mutex::new(vec![]),
        }
    }

    pub fn commands(&self) -> Vec<ManagerCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<TransferId> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                ManagerCommand::Submit(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, command: ManagerCommand) {
        self.commands.lock().unwrap().push(command);
    }
}

impl EngineManager for MockManager {
    fn network(&self) -> &Network {
        &self.network
    }

    fn mode(&self) -> WalletManagerMode {
        *self.mode.lock().unwrap()
    }

    fn set_mode(&self, mode: WalletManagerMode) {
        *self.mode.lock().unwrap() = mode;
        self.record(ManagerCommand::SetMode(mode));
    }

    fn state(&self) -> ManagerState {
        self.state.lock().unwrap().clone()
    }

    fn connect(&self) {
        *self.state.lock().unwrap() = ManagerState::Connected;
        self.record(ManagerCommand::Connect);
    }

    fn disconnect(&self) {
        *self.state.lock().unwrap() = ManagerState::Disconnected { reason: None };
        self.record(ManagerCommand::Disconnect);
    }

    fn sync_to_depth(&self, depth: SyncDepth) {
        self.record(ManagerCommand::SyncToDepth(depth));
    }

    fn submit(&self, _wallet: &dyn EngineWallet, transfer: &Transfer, _secret: &[u8]) {
        self.record(ManagerCommand::Submit(transfer.id.clone()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Start(Vec<String>),
    Stop,
    CreateManager {
        network: String,
        mode: WalletManagerMode,
    },
}

/// Engine that announces its fixture networks on `start` and answers manager requests with
/// a manager plus one wallet per requested currency.
pub struct MockEngine {
    networks: Vec<Network>,
    unsupported: Vec<WalletManagerMode>,
    events: EngineEventSender,
    commands: Mutex<Vec<EngineCommand>>,
    managers: Mutex<Vec<Arc<MockManager>>>,
}

impl MockEngine {
    pub fn commands(&self) -> Vec<EngineCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn managers(&self) -> Vec<Arc<MockManager>> {
        self.managers.lock().unwrap().clone()
    }

    pub fn events(&self) -> &EngineEventSender {
        &self.events
    }

    fn record(&self, command: EngineCommand) {
        self.commands.lock().unwrap().push(command);
    }
}

impl BlockchainEngine for MockEngine {
    fn start(&self, required_networks: &[String]) {
        self.record(EngineCommand::Start(required_networks.to_vec()));
        for network in &self.networks {
            if required_networks.contains(&network.id) {
                self.events
                    .send(EngineEvent::System(SystemEvent::NetworkAdded(network.clone())));
            }
        }
    }

    fn stop(&self) {
        self.record(EngineCommand::Stop);
    }

    fn supports_mode(&self, _network: &Network, mode: WalletManagerMode) -> bool {
        !self.unsupported.contains(&mode)
    }

    fn default_mode(&self, _network: &Network) -> WalletManagerMode {
        WalletManagerMode::ALL
            .into_iter()
            .find(|m| !self.unsupported.contains(m))
            .unwrap_or(WalletManagerMode::ApiOnly)
    }

    fn create_wallet_manager(
        &self,
        network: &Network,
        mode: WalletManagerMode,
        currencies: &[CurrencyId],
    ) -> Result<(), EngineError> {
        self.record(EngineCommand::CreateManager {
            network: network.id.clone(),
            mode,
        });
        let manager = Arc::new(MockManager::with_mode(network.clone(), mode));
        self.managers.lock().unwrap().push(manager.clone());

        let as_engine: Arc<dyn EngineManager> = manager;
        self.events
            .send(EngineEvent::System(SystemEvent::ManagerAdded(as_engine.clone())));
        for core in network.currencies.iter().filter(|c| currencies.contains(&c.uid)) {
            let wallet: Arc<dyn EngineWallet> = Arc::new(MockWallet::for_currency(core.clone()));
            self.events.send(EngineEvent::Manager {
                manager: as_engine.clone(),
                event: ManagerEvent::WalletAdded(wallet),
            });
        }
        Ok(())
    }
}

/// Builds a fresh [`MockEngine`] per session and keeps every one it built.
pub struct MockEngineFactory {
    networks: Vec<Network>,
    unsupported: Vec<WalletManagerMode>,
    engines: Mutex<Vec<Arc<MockEngine>>>,
}

impl MockEngineFactory {
    pub fn new(networks: Vec<Network>) -> Self {
        Self {
            networks,
            unsupported: vec![],
            engines: Mutex::new(vec![]),
        }
    }

    pub fn without_modes(mut self, unsupported: Vec<WalletManagerMode>) -> Self {
        self.unsupported = unsupported;
        self
    }

    pub fn engines(&self) -> Vec<Arc<MockEngine>> {
        self.engines.lock().unwrap().clone()
    }

    pub fn last_engine(&self) -> Option<Arc<MockEngine>> {
        self.engines.lock().unwrap().last().cloned()
    }
}

impl EngineFactory for MockEngineFactory {
    fn create_system(
        &self,
        _account: &Account,
        _on_mainnet: bool,
        _data_dir: &Path,
        events: EngineEventSender,
    ) -> Result<Arc<dyn BlockchainEngine>, EngineError> {
        let engine = Arc::new(MockEngine {
            networks: self.networks.clone(),
            unsupported: self.unsupported.clone(),
            events,
            commands: Mutex::new(vec![]),
            managers: Mutex::new(vec![]),
        });
        self.engines.lock().unwrap().push(engine.clone());
        Ok(engine)
    }
}
