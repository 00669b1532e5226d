use crate::catalog::{CatalogError, CurrencyId};
use crate::engine::{EngineError, TransferId};
use crate::replica::ReplicaError;
use crate::wallet::CreateTransferError;
use std::fmt;

/// Registry lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	Uninitialized,
	Idle,
	Active,
}

impl fmt::Display for LifecycleState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			LifecycleState::Uninitialized => "uninitialized",
			LifecycleState::Idle => "idle",
			LifecycleState::Active => "active",
		};
		f.write_str(name)
	}
}

/// Broken assumptions about the order or content of engine events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
	#[error("manager already exists for network {0}")]
	DuplicateManager(String),

	#[error("wallet controller already exists for {0}")]
	DuplicateController(CurrencyId),

	#[error("currency already registered: {0}")]
	DuplicateCurrency(CurrencyId),

	#[error("no catalog metadata for {0}")]
	MissingMetadata(CurrencyId),

	#[error("network has no units for {0}")]
	MissingUnits(CurrencyId),

	#[error("unknown currency {0}")]
	UnknownCurrency(CurrencyId),

	#[error("no wallet controller for {0}")]
	MissingController(CurrencyId),

	#[error("send already pending for {currency}: {transfer_id}")]
	SendAlreadyPending {
		currency: CurrencyId,
		transfer_id: TransferId,
	},
}

#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
	#[error("Cannot {operation} while {state}")]
	InvalidLifecycle {
		operation: &'static str,
		state: LifecycleState,
	},

	#[error("Invariant violation: {0}")]
	Invariant(#[from] InvariantViolation),

	#[error("Catalog error: {0}")]
	Catalog(#[from] CatalogError),

	#[error("Replica error: {0}")]
	Replica(#[from] ReplicaError),

	#[error("Engine error: {0}")]
	Engine(#[from] EngineError),

	#[error("Create transfer error: {0}")]
	CreateTransfer(#[from] CreateTransferError),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("No manager for network {0}")]
	UnknownNetwork(String),

	#[error("No wallet for {0}")]
	UnknownWallet(CurrencyId),

	#[error("Registry queue closed")]
	QueueClosed,
}

impl RegistryError {
	pub fn is_invariant_violation(&self) -> bool {
		matches!(self, RegistryError::Invariant(_))
	}
}
