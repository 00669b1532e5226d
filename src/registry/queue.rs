//! Registry queue.
//!
//! One task owns the [`WalletRegistry`] and drains a single unbounded channel carrying both
//! caller commands and engine events, so everything the registry does happens in one total
//! order. Callers talk to the task through a cloneable [`RegistryHandle`]; each command carries
//! a oneshot reply. The engine gets an [`EngineEventSender`] bound to the same channel, and
//! "replica synced" notifications from the store are forwarded onto it as well.
//!
//! Errors from commands go back to the caller. Errors from engine events are logged, except
//! invariant violations, which stop the task with a panic.

use super::wallet_registry::WalletRegistry;
use super::types::{LifecycleState, RegistryError};
use crate::catalog::{CurrencyId, CurrencyMetadataCache};
use crate::config::SyncCoreConfig;
use crate::engine::{
    Account, Amount, EngineEvent, EngineFactory, SyncDepth, Transfer, TransferFeeBasis,
    TransferId, WalletManagerMode,
};
use crate::replica::{ReplicaSyncListener, ReplicatedKvStore, SyncNotice};
use crate::state::StatePublisher;
use crate::wallet::SendOutcome;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Reply<T> = oneshot::Sender<Result<T, RegistryError>>;

/// A caller request for the registry task
pub enum RegistryCommand {
    Create {
        account: Account,
        reply: Reply<()>,
    },
    Connect {
        reply: Reply<()>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    Shutdown {
        reply: Reply<()>,
    },
    SetConnectionMode {
        network_id: String,
        mode: WalletManagerMode,
        reply: Reply<()>,
    },
    Rescan {
        network_id: String,
        depth: SyncDepth,
        reply: Reply<()>,
    },
    UpdateManagerConnections {
        enabled: Vec<CurrencyId>,
        reply: Reply<()>,
    },
    CreateTransfer {
        uid: CurrencyId,
        address: String,
        amount: Amount,
        fee_basis: TransferFeeBasis,
        reply: Reply<Transfer>,
    },
    SubmitTransfer {
        uid: CurrencyId,
        transfer: Transfer,
        secret: Vec<u8>,
        reply: Reply<oneshot::Receiver<SendOutcome>>,
    },
    UnsubscribeSend {
        uid: CurrencyId,
        transfer_id: TransferId,
        reply: Reply<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<RegistrySnapshot>,
    },
}

/// Everything that travels on the registry channel
pub enum QueueMessage {
    Command(RegistryCommand),
    Engine(EngineEvent),
    ReplicaSynced(SyncNotice),
}

/// A point-in-time summary of the registry contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub lifecycle: LifecycleState,
    pub currencies: Vec<CurrencyId>,
    pub managers: Vec<String>,
    pub wallets: Vec<CurrencyId>,
}

impl RegistrySnapshot {
    fn of(registry: &WalletRegistry) -> Self {
        Self {
            lifecycle: registry.lifecycle(),
            currencies: registry.currencies().into_iter().map(|c| c.uid).collect(),
            managers: registry.manager_ids(),
            wallets: registry.wallet_ids(),
        }
    }
}

/// Handed to the engine; forwards its events onto the registry queue.
#[derive(Clone)]
pub struct EngineEventSender {
    tx: mpsc::UnboundedSender<QueueMessage>,
}

impl EngineEventSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<QueueMessage>) -> Self {
        Self { tx }
    }

    /// Queue an event. Returns false once the registry task has stopped.
    pub fn send(&self, event: EngineEvent) -> bool {
        self.tx.send(QueueMessage::Engine(event)).is_ok()
    }
}

/// Caller side of the registry queue
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::UnboundedSender<QueueMessage>,
}

impl RegistryHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueueMessage::Command(build(reply)))
            .map_err(|_| RegistryError::QueueClosed)?;
        rx.await.map_err(|_| RegistryError::QueueClosed)?
    }

    pub async fn create(&self, account: Account) -> Result<(), RegistryError> {
        self.request(|reply| RegistryCommand::Create { account, reply })
            .await
    }

    pub async fn connect(&self) -> Result<(), RegistryError> {
        self.request(|reply| RegistryCommand::Connect { reply }).await
    }

    pub async fn disconnect(&self) -> Result<(), RegistryError> {
        self.request(|reply| RegistryCommand::Disconnect { reply })
            .await
    }

    pub async fn shutdown(&self) -> Result<(), RegistryError> {
        self.request(|reply| RegistryCommand::Shutdown { reply })
            .await
    }

    pub async fn set_connection_mode(
        &self,
        network_id: &str,
        mode: WalletManagerMode,
    ) -> Result<(), RegistryError> {
        let network_id = network_id.to_string();
        self.request(|reply| RegistryCommand::SetConnectionMode {
            network_id,
            mode,
            reply,
        })
        .await
    }

    pub async fn rescan(&self, network_id: &str, depth: SyncDepth) -> Result<(), RegistryError> {
        let network_id = network_id.to_string();
        self.request(|reply| RegistryCommand::Rescan {
            network_id,
            depth,
            reply,
        })
        .await
    }

    pub async fn update_manager_connections(
        &self,
        enabled: Vec<CurrencyId>,
    ) -> Result<(), RegistryError> {
        self.request(|reply| RegistryCommand::UpdateManagerConnections { enabled, reply })
            .await
    }

    pub async fn create_transfer(
        &self,
        uid: CurrencyId,
        address: &str,
        amount: Amount,
        fee_basis: TransferFeeBasis,
    ) -> Result<Transfer, RegistryError> {
        let address = address.to_string();
        self.request(|reply| RegistryCommand::CreateTransfer {
            uid,
            address,
            amount,
            fee_basis,
            reply,
        })
        .await
    }

    /// Submit a transfer. The returned receiver resolves when the engine reports the outcome.
    pub async fn submit_transfer(
        &self,
        uid: CurrencyId,
        transfer: Transfer,
        secret: Vec<u8>,
    ) -> Result<oneshot::Receiver<SendOutcome>, RegistryError> {
        self.request(|reply| RegistryCommand::SubmitTransfer {
            uid,
            transfer,
            secret,
            reply,
        })
        .await
    }

    pub async fn unsubscribe_send(
        &self,
        uid: CurrencyId,
        transfer_id: TransferId,
    ) -> Result<bool, RegistryError> {
        self.request(|reply| RegistryCommand::UnsubscribeSend {
            uid,
            transfer_id,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(QueueMessage::Command(RegistryCommand::Snapshot { reply }))
            .map_err(|_| RegistryError::QueueClosed)?;
        rx.await.map_err(|_| RegistryError::QueueClosed)
    }
}

/// Build a registry and run it on its own task.
pub fn spawn_registry(
    config: SyncCoreConfig,
    engine_factory: Arc<dyn EngineFactory>,
    metadata_cache: CurrencyMetadataCache,
    store: Arc<dyn ReplicatedKvStore>,
    publisher: StatePublisher,
) -> (RegistryHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(forward_sync_notices(
        ReplicaSyncListener::new(store.as_ref()),
        tx.clone(),
    ));
    let registry = WalletRegistry::new(
        config,
        engine_factory,
        metadata_cache,
        store,
        publisher,
        EngineEventSender::new(tx.clone()),
    );
    let task = tokio::spawn(run_registry(registry, rx));
    (RegistryHandle { tx }, task)
}

async fn forward_sync_notices(
    mut listener: ReplicaSyncListener,
    tx: mpsc::UnboundedSender<QueueMessage>,
) {
    while let Some(notice) = listener.next().await {
        if tx.send(QueueMessage::ReplicaSynced(notice)).is_err() {
            break;
        }
    }
    debug!("Replica sync forwarding stopped");
}

async fn run_registry(mut registry: WalletRegistry, mut rx: mpsc::UnboundedReceiver<QueueMessage>) {
    info!("Registry queue started");
    while let Some(message) = rx.recv().await {
        match message {
            QueueMessage::Command(command) => execute(&mut registry, command).await,
            QueueMessage::Engine(event) => {
                let description = event.to_string();
                match registry.handle_engine_event(event).await {
                    Ok(()) => {}
                    Err(RegistryError::Invariant(violation)) => {
                        error!("Invariant violated handling {}: {}", description, violation);
                        panic!("registry invariant violated: {violation}");
                    }
                    Err(e) => error!("Error handling {}: {}", description, e),
                }
            }
            QueueMessage::ReplicaSynced(notice) => {
                if let Err(e) = registry.handle_sync_notice(&notice).await {
                    warn!("Error reconciling replica sync {:?}: {}", notice, e);
                }
            }
        }
    }
    info!("Registry queue stopped");
}

fn respond<T>(reply: Reply<T>, result: Result<T, RegistryError>) {
    if reply.send(result).is_err() {
        debug!("Registry caller went away before the reply");
    }
}

async fn execute(registry: &mut WalletRegistry, command: RegistryCommand) {
    match command {
        RegistryCommand::Create { account, reply } => {
            respond(reply, registry.create(account).await)
        }
        RegistryCommand::Connect { reply } => respond(reply, registry.connect().await),
        RegistryCommand::Disconnect { reply } => respond(reply, registry.disconnect()),
        RegistryCommand::Shutdown { reply } => respond(reply, registry.shutdown().await),
        RegistryCommand::SetConnectionMode {
            network_id,
            mode,
            reply,
        } => respond(reply, registry.set_connection_mode(&network_id, mode).await),
        RegistryCommand::Rescan {
            network_id,
            depth,
            reply,
        } => respond(reply, registry.rescan(&network_id, depth)),
        RegistryCommand::UpdateManagerConnections { enabled, reply } => {
            respond(reply, registry.update_manager_connections(&enabled))
        }
        RegistryCommand::CreateTransfer {
            uid,
            address,
            amount,
            fee_basis,
            reply,
        } => respond(
            reply,
            registry.create_transfer(&uid, &address, &amount, &fee_basis),
        ),
        RegistryCommand::SubmitTransfer {
            uid,
            transfer,
            secret,
            reply,
        } => respond(reply, registry.submit_transfer(&uid, &transfer, &secret)),
        RegistryCommand::UnsubscribeSend {
            uid,
            transfer_id,
            reply,
        } => respond(reply, registry.unsubscribe_send(&uid, &transfer_id)),
        RegistryCommand::Snapshot { reply } => {
            if reply.send(RegistrySnapshot::of(registry)).is_err() {
                debug!("Registry caller went away before the snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineEvent, EngineManager, EngineWallet, ManagerEvent};
    use crate::registry::InvariantViolation;
    use crate::replica::InMemoryKvStore;
    use crate::test_support::{
        BTC_UID, MockEngineFactory, MockWallet, StubCatalogSource, bitcoin_network,
        put_remote_mode,
    };
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn spawn(factory: Arc<MockEngineFactory>) -> (RegistryHandle, JoinHandle<()>, TempDir) {
        spawn_with_store(factory, Arc::new(InMemoryKvStore::new()))
    }

    fn spawn_with_store(
        factory: Arc<MockEngineFactory>,
        store: Arc<InMemoryKvStore>,
    ) -> (RegistryHandle, JoinHandle<()>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncCoreConfig {
            data_dir: dir.path().to_path_buf(),
            required_networks: vec!["bitcoin-mainnet".into()],
            ..SyncCoreConfig::default()
        };
        let cache = CurrencyMetadataCache::new(
            Arc::new(StubCatalogSource::failing()),
            config.catalog_cache_path(),
            None,
            Duration::from_secs(1),
        );
        let (publisher, _state_rx) = StatePublisher::channel();
        let (handle, task) = spawn_registry(
            config,
            factory,
            cache,
            store,
            publisher,
        );
        (handle, task, dir)
    }

    fn account() -> Account {
        Account {
            uids: "account-1".into(),
            timestamp: Utc::now(),
        }
    }

    /// Events the engine queued while handling earlier events land behind the first
    /// snapshot, so a second round trip sees them applied.
    async fn settle(handle: &RegistryHandle) -> RegistrySnapshot {
        handle.snapshot().await.unwrap();
        handle.snapshot().await.unwrap()
    }

    #[tokio::test]
    async fn commands_and_events_share_one_order() {
        let factory = Arc::new(MockEngineFactory::new(vec![bitcoin_network()]));
        let (handle, _task, _dir) = spawn(factory);

        assert!(matches!(
            handle.connect().await,
            Err(RegistryError::InvalidLifecycle { .. })
        ));
        handle.create(account()).await.unwrap();
        handle.connect().await.unwrap();

        let snapshot = settle(&handle).await;
        assert_eq!(snapshot.lifecycle, LifecycleState::Active);
        assert_eq!(snapshot.managers, vec!["bitcoin-mainnet"]);
        assert_eq!(snapshot.wallets, snapshot.currencies);

        handle.shutdown().await.unwrap();
        handle.create(account()).await.unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.currencies.is_empty());
        assert!(snapshot.wallets.is_empty());
    }

    #[tokio::test]
    async fn reconnect_keeps_the_queue_running() {
        let factory = Arc::new(MockEngineFactory::new(vec![bitcoin_network()]));
        let (handle, task, _dir) = spawn(factory);
        handle.create(account()).await.unwrap();
        handle.connect().await.unwrap();
        let first = settle(&handle).await;

        handle.disconnect().await.unwrap();
        handle.connect().await.unwrap();
        let second = settle(&handle).await;

        assert!(!task.is_finished());
        assert_eq!(second.lifecycle, LifecycleState::Active);
        assert_eq!(second.managers, first.managers);
        assert_eq!(second.wallets, first.wallets);
    }

    #[tokio::test]
    async fn remote_wallet_info_reaches_the_registry() {
        let factory = Arc::new(MockEngineFactory::new(vec![bitcoin_network()]));
        let store = Arc::new(InMemoryKvStore::new());
        let (handle, _task, _dir) = spawn_with_store(factory.clone(), store.clone());
        handle.create(account()).await.unwrap();
        handle.connect().await.unwrap();
        settle(&handle).await;
        let manager = factory.last_engine().unwrap().managers()[0].clone();

        put_remote_mode(&store, BTC_UID, WalletManagerMode::ApiOnly, 50).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.mode() != WalletManagerMode::ApiOnly {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn command_invariant_errors_are_returned() {
        let factory = Arc::new(MockEngineFactory::new(vec![bitcoin_network()]));
        let (handle, _task, _dir) = spawn(factory);
        handle.create(account()).await.unwrap();
        handle.connect().await.unwrap();
        settle(&handle).await;

        let btc = CurrencyId::from("bitcoin-mainnet:__native__");
        let amount = Amount {
            base_units: 1_000,
            currency: btc.clone(),
        };
        let fee = TransferFeeBasis {
            price_per_cost_factor: 1,
            cost_factor: 100,
        };
        let transfer = handle
            .create_transfer(btc.clone(), "addr-1", amount, fee)
            .await
            .unwrap();
        let _pending = handle
            .submit_transfer(btc.clone(), transfer.clone(), b"k".to_vec())
            .await
            .unwrap();

        let second = handle
            .submit_transfer(btc.clone(), transfer.clone(), b"k".to_vec())
            .await;
        assert!(matches!(
            second,
            Err(RegistryError::Invariant(InvariantViolation::SendAlreadyPending { .. }))
        ));
        assert!(handle.unsubscribe_send(btc, transfer.id).await.unwrap());
    }

    #[tokio::test]
    async fn engine_invariant_violation_stops_the_queue() {
        let factory = Arc::new(MockEngineFactory::new(vec![bitcoin_network()]));
        let (handle, task, _dir) = spawn(factory.clone());
        handle.create(account()).await.unwrap();
        handle.connect().await.unwrap();
        settle(&handle).await;

        let engine = factory.last_engine().unwrap();
        let manager: Arc<dyn EngineManager> = engine.managers()[0].clone();
        let stray: Arc<dyn EngineWallet> =
            Arc::new(MockWallet::new(CurrencyId::from("bitcoin-mainnet:0xfeed")));
        assert!(engine.events().send(EngineEvent::Manager {
            manager,
            event: ManagerEvent::WalletAdded(stray),
        }));

        let joined = task.await;
        assert!(joined.unwrap_err().is_panic());
        assert!(matches!(
            handle.snapshot().await,
            Err(RegistryError::QueueClosed)
        ));
    }
}
