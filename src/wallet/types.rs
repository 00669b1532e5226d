use crate::engine::TransferId;

/// Reasons a transfer could not be built
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreateTransferError {
	#[error("Invalid address: {0}")]
	InvalidAddress(String),

	#[error("Invalid amount or fee")]
	InvalidAmountOrFee,
}

/// Result delivered to a send subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
	Submitted(TransferId),
	Failed(TransferId),
}

impl SendOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, SendOutcome::Submitted(_))
	}
}
