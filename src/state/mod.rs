//! Application-visible state.
//!
//! The registry never writes [`AppState`] directly. It publishes [`StateAction`]s through a
//! [`StatePublisher`]; a separate task owns the receiving end and applies them to the shared
//! [`AppStateStore`]. Readers take snapshots from the store.

use crate::catalog::CurrencyId;
use crate::engine::{Amount, Transfer};
use crate::registry::Currency;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Connecting,
    Syncing,
    Success,
}

#[derive(Debug, Clone)]
pub struct WalletState {
    pub currency: Currency,
    pub sync_state: SyncState,
    /// Percent complete of the running sync, 0 to 100.
    pub sync_progress: f64,
    pub last_block_timestamp: Option<DateTime<Utc>>,
    pub is_rescanning: bool,
    pub balance: Option<Amount>,
    pub transfers: Vec<Transfer>,
}

impl WalletState {
    pub fn new(currency: Currency) -> Self {
        Self {
            currency,
            sync_state: SyncState::Connecting,
            sync_progress: 0.0,
            last_block_timestamp: None,
            is_rescanning: false,
            balance: None,
            transfers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// Every registered currency across all networks.
    pub currencies: Vec<Currency>,
    pub wallets: HashMap<CurrencyId, WalletState>,
}

/// A change to [`AppState`]
#[derive(Debug, Clone)]
pub enum StateAction {
    CurrenciesUpdated(Vec<Currency>),
    WalletAdded {
        currency: Currency,
        balance: Amount,
        transfers: Vec<Transfer>,
    },
    WalletRemoved(CurrencyId),
    SyncStateChanged {
        uid: CurrencyId,
        state: SyncState,
    },
    SyncProgress {
        uid: CurrencyId,
        percent: f64,
        timestamp: Option<DateTime<Utc>>,
    },
    Rescanning {
        uid: CurrencyId,
        is_rescanning: bool,
    },
    BalanceUpdated {
        uid: CurrencyId,
        balance: Amount,
    },
    TransfersUpdated {
        uid: CurrencyId,
        transfers: Vec<Transfer>,
    },
    Reset,
}

/// Sending half of the state channel. Sends never block.
#[derive(Clone)]
pub struct StatePublisher {
    tx: mpsc::UnboundedSender<StateAction>,
}

impl StatePublisher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StateAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, action: StateAction) {
        if self.tx.send(action).is_err() {
            warn!("State channel closed, dropping state action");
        }
    }
}

/// Shared handle to the current [`AppState`].
#[derive(Clone, Default)]
pub struct AppStateStore {
    inner: Arc<RwLock<AppState>>,
}

impl AppStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AppState {
        match self.inner.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn wallet(&self, uid: &CurrencyId) -> Option<WalletState> {
        self.snapshot().wallets.get(uid).cloned()
    }

    pub fn apply(&self, action: StateAction) {
        let mut state = match self.inner.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        reduce(&mut state, action);
    }

    /// Apply every action already queued on `rx` without waiting for more.
    pub fn drain(&self, rx: &mut mpsc::UnboundedReceiver<StateAction>) -> usize {
        let mut applied = 0;
        while let Ok(action) = rx.try_recv() {
            self.apply(action);
            applied += 1;
        }
        applied
    }
}

fn reduce(state: &mut AppState, action: StateAction) {
    match action {
        StateAction::CurrenciesUpdated(currencies) => state.currencies = currencies,
        StateAction::WalletAdded {
            currency,
            balance,
            transfers,
        } => {
            let mut wallet = WalletState::new(currency);
            wallet.balance = Some(balance);
            wallet.transfers = transfers;
            state.wallets.insert(wallet.currency.uid.clone(), wallet);
        }
        StateAction::WalletRemoved(uid) => {
            state.wallets.remove(&uid);
        }
        StateAction::SyncStateChanged { uid, state: sync } => {
            if let Some(wallet) = state.wallets.get_mut(&uid) {
                wallet.sync_state = sync;
                if sync != SyncState::Syncing {
                    wallet.is_rescanning = false;
                }
                if sync == SyncState::Success {
                    wallet.sync_progress = 100.0;
                }
            }
        }
        StateAction::SyncProgress {
            uid,
            percent,
            timestamp,
        } => {
            if let Some(wallet) = state.wallets.get_mut(&uid) {
                wallet.sync_progress = percent;
                if timestamp.is_some() {
                    wallet.last_block_timestamp = timestamp;
                }
            }
        }
        StateAction::Rescanning { uid, is_rescanning } => {
            if let Some(wallet) = state.wallets.get_mut(&uid) {
                wallet.is_rescanning = is_rescanning;
            }
        }
        StateAction::BalanceUpdated { uid, balance } => {
            if let Some(wallet) = state.wallets.get_mut(&uid) {
                wallet.balance = Some(balance);
            }
        }
        StateAction::TransfersUpdated { uid, transfers } => {
            if let Some(wallet) = state.wallets.get_mut(&uid) {
                wallet.transfers = transfers;
            }
        }
        StateAction::Reset => *state = AppState::default(),
    }
}

/// Spawn the task that owns writes to `store`. It ends when every publisher is dropped.
pub fn spawn_state_task(
    store: AppStateStore,
    mut rx: mpsc::UnboundedReceiver<StateAction>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(action) = rx.recv().await {
            store.apply(action);
        }
        debug!("State task finished");
    })
}
