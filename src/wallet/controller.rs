//! Per-currency wallet controller.
//!
//! Wraps an engine wallet and its manager, turns wallet and transfer events into state
//! actions, and correlates submissions with a single pending send subscription.

use super::types::{CreateTransferError, SendOutcome};
use crate::catalog::CurrencyId;
use crate::engine::{
    Address, Amount, EngineManager, EngineWallet, Transfer, TransferEvent, TransferFeeBasis,
    TransferId, TransferState, WalletEvent, WalletListener,
};
use crate::registry::{Currency, InvariantViolation};
use crate::state::{StateAction, StatePublisher};
use crate::utils::format_token_amount;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::cmp::Reverse;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

struct SendSubscription {
    transfer_id: TransferId,
    notifier: oneshot::Sender<SendOutcome>,
}

pub struct WalletController {
    currency: Currency,
    core: Arc<dyn EngineWallet>,
    manager: Arc<dyn EngineManager>,
    send_subscription: Option<SendSubscription>,
    publisher: StatePublisher,
}

impl WalletController {
    pub fn new(
        currency: Currency,
        core: Arc<dyn EngineWallet>,
        manager: Arc<dyn EngineManager>,
        publisher: StatePublisher,
    ) -> Self {
        Self {
            currency,
            core,
            manager,
            send_subscription: None,
            publisher,
        }
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn uid(&self) -> &CurrencyId {
        &self.currency.uid
    }

    pub fn manager(&self) -> &Arc<dyn EngineManager> {
        &self.manager
    }

    pub fn balance(&self) -> Amount {
        self.core.balance()
    }

    pub fn receive_address(&self) -> Address {
        self.core.target()
    }

    /// Visible transfers, newest first. Transfers without a timestamp are still pending
    /// and sort ahead of confirmed ones.
    pub fn transfers(&self) -> Vec<Transfer> {
        self.core
            .transfers()
            .into_iter()
            .filter(Transfer::is_visible)
            .sorted_by_key(|t| Reverse(t.timestamp.unwrap_or(DateTime::<Utc>::MAX_UTC)))
            .collect()
    }

    pub fn create_transfer(
        &self,
        address: &str,
        amount: &Amount,
        fee_basis: &TransferFeeBasis,
    ) -> Result<Transfer, CreateTransferError> {
        let target = self
            .core
            .address_for(address)
            .ok_or_else(|| CreateTransferError::InvalidAddress(address.to_string()))?;
        self.core
            .create_transfer(&target, amount, fee_basis)
            .ok_or(CreateTransferError::InvalidAmountOrFee)
    }

    pub fn submit_transfer(&self, transfer: &Transfer, secret: &[u8]) {
        info!(
            "Submitting {} transfer {} of {}",
            self.currency.code,
            transfer.id,
            format_token_amount(transfer.amount.base_units, self.currency.default_unit.decimals)
        );
        self.manager.submit(self.core.as_ref(), transfer, secret);
    }

    /// Register the single pending send. A subscription whose receiver was dropped
    /// no longer counts as pending.
    pub fn subscribe(
        &mut self,
        transfer_id: TransferId,
        notifier: oneshot::Sender<SendOutcome>,
    ) -> Result<(), InvariantViolation> {
        if let Some(existing) = &self.send_subscription {
            if !existing.notifier.is_closed() {
                return Err(InvariantViolation::SendAlreadyPending {
                    currency: self.currency.uid.clone(),
                    transfer_id: existing.transfer_id.clone(),
                });
            }
            debug!("Replacing abandoned send subscription for {}", existing.transfer_id);
        }
        self.send_subscription = Some(SendSubscription {
            transfer_id,
            notifier,
        });
        Ok(())
    }

    /// Clear the subscription if it belongs to `transfer_id`. Returns true if cleared.
    pub fn unsubscribe(&mut self, transfer_id: &TransferId) -> bool {
        match &self.send_subscription {
            Some(sub) if &sub.transfer_id == transfer_id => {
                self.send_subscription = None;
                true
            }
            _ => false,
        }
    }

    pub fn has_pending_send(&self) -> bool {
        self.send_subscription.is_some()
    }

    fn resolve_send(&mut self, transfer_id: &TransferId, success: bool) {
        let matches = self
            .send_subscription
            .as_ref()
            .is_some_and(|sub| &sub.transfer_id == transfer_id);
        if !matches {
            return;
        }
        let Some(sub) = self.send_subscription.take() else {
            return;
        };
        let outcome = if success {
            SendOutcome::Submitted(sub.transfer_id)
        } else {
            SendOutcome::Failed(sub.transfer_id)
        };
        if sub.notifier.send(outcome).is_err() {
            debug!("Send subscriber for {} went away", transfer_id);
        }
    }

    fn publish_transfers(&self) {
        self.publisher.publish(StateAction::TransfersUpdated {
            uid: self.currency.uid.clone(),
            transfers: self.transfers(),
        });
    }
}

impl WalletListener for WalletController {
    fn handle_wallet_event(&mut self, event: &WalletEvent) {
        match event {
            WalletEvent::BalanceUpdated(amount) => {
                debug!(
                    "{} balance: {}",
                    self.currency.code,
                    format_token_amount(amount.base_units, self.currency.default_unit.decimals)
                );
                self.publisher.publish(StateAction::BalanceUpdated {
                    uid: self.currency.uid.clone(),
                    balance: amount.clone(),
                });
            }
            WalletEvent::TransferSubmitted { transfer, success } => {
                self.resolve_send(&transfer.id, *success);
                self.publish_transfers();
            }
            WalletEvent::TransferAdded(_)
            | WalletEvent::TransferChanged(_)
            | WalletEvent::TransferDeleted(_) => self.publish_transfers(),
            WalletEvent::Created
            | WalletEvent::Changed
            | WalletEvent::Deleted
            | WalletEvent::FeeBasisUpdated => {}
        }
    }

    fn handle_transfer_event(&mut self, transfer: &Transfer, event: &TransferEvent) {
        if let TransferEvent::Changed { old, new } = event {
            match new {
                TransferState::Submitted => {
                    if *old != TransferState::Signed {
                        debug!("Transfer {} submitted from state {:?}", transfer.id, old);
                    }
                    self.resolve_send(&transfer.id, true);
                }
                TransferState::Failed { reason } => {
                    warn!("Transfer {} failed: {}", transfer.id, reason);
                    self.resolve_send(&transfer.id, false);
                }
                _ => {}
            }
        }
        self.publish_transfers();
    }
}
