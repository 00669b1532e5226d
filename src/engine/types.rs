//! Types exchanged with the blockchain engine

use crate::catalog::{CurrencyId, TokenType};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A currency as the engine describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCurrency {
    pub uid: CurrencyId,
    pub code: String,
    pub name: String,
    pub token_type: TokenType,
}

/// A denomination of a currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub symbol: String,
    /// Decimal places relative to the base unit.
    pub decimals: u8,
}

/// The unit set of one currency on one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyUnits {
    pub base: Unit,
    pub default: Unit,
    pub all: Vec<Unit>,
}

/// A blockchain network known to the engine. Identity is the network id.
#[derive(Debug, Clone)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub is_mainnet: bool,
    /// The network's native currency.
    pub currency: CurrencyId,
    pub currencies: Vec<EngineCurrency>,
    pub units: HashMap<CurrencyId, CurrencyUnits>,
}

impl Network {
    pub fn units_for(&self, uid: &CurrencyId) -> Option<&CurrencyUnits> {
        self.units.get(uid)
    }
}

impl PartialEq for Network {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Network {}

impl Hash for Network {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// An amount in base units of a currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Amount {
    pub base_units: u128,
    pub currency: CurrencyId,
}

impl Amount {
    pub fn zero(currency: CurrencyId) -> Self {
        Self {
            base_units: 0,
            currency,
        }
    }
}

/// Engine-assigned identifier of a transfer, stable across state changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferId(pub String);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-chain transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferHash(pub [u8; 32]);

impl fmt::Display for TransferHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Created,
    Signed,
    Submitted,
    Pending,
    Included,
    Failed { reason: String },
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Sent,
    Received,
    Recovered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub id: TransferId,
    pub hash: Option<TransferHash>,
    pub state: TransferState,
    pub direction: TransferDirection,
    pub amount: Amount,
    pub timestamp: Option<DateTime<Utc>>,
    pub target: Address,
}

impl Transfer {
    /// Deleted transfers and outgoing transfers that were never submitted are hidden.
    pub fn is_visible(&self) -> bool {
        match self.state {
            TransferState::Deleted => false,
            TransferState::Created | TransferState::Signed => {
                self.direction != TransferDirection::Sent
            }
            _ => true,
        }
    }
}

/// Fee basis chosen for a transfer, in base units of the network currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFeeBasis {
    pub price_per_cost_factor: u128,
    pub cost_factor: u64,
}

impl TransferFeeBasis {
    pub fn fee(&self) -> u128 {
        self.price_per_cost_factor.saturating_mul(self.cost_factor as u128)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(pub String);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a wallet manager talks to its network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletManagerMode {
    ApiOnly,
    ApiWithP2pSubmit,
    P2pWithApiSync,
    P2pOnly,
}

impl WalletManagerMode {
    pub const ALL: [WalletManagerMode; 4] = [
        WalletManagerMode::ApiOnly,
        WalletManagerMode::ApiWithP2pSubmit,
        WalletManagerMode::P2pWithApiSync,
        WalletManagerMode::P2pOnly,
    ];

    /// Stable numeric form used in persisted settings.
    pub fn serialization(&self) -> u8 {
        match self {
            WalletManagerMode::ApiOnly => 0,
            WalletManagerMode::ApiWithP2pSubmit => 1,
            WalletManagerMode::P2pWithApiSync => 2,
            WalletManagerMode::P2pOnly => 3,
        }
    }

    pub fn from_serialization(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.serialization() == value)
    }
}

impl fmt::Display for WalletManagerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WalletManagerMode::ApiOnly => "api_only",
            WalletManagerMode::ApiWithP2pSubmit => "api_with_p2p_submit",
            WalletManagerMode::P2pWithApiSync => "p2p_with_api_sync",
            WalletManagerMode::P2pOnly => "p2p_only",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerState {
    Created,
    Disconnected { reason: Option<String> },
    Connected,
    Syncing,
    Deleted,
}

/// How far back a rescan reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDepth {
    FromLastConfirmedSend,
    FromLastTrustedBlock,
    FromCreation,
}

/// The account an engine session is bound to.
#[derive(Debug, Clone)]
pub struct Account {
    pub uids: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine error: {0}")]
    Failed(String),

    #[error("Unsupported mode {mode} for network {network}")]
    UnsupportedMode {
        network: String,
        mode: WalletManagerMode,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(state: TransferState, direction: TransferDirection) -> Transfer {
        Transfer {
            id: TransferId("t1".into()),
            hash: None,
            state,
            direction,
            amount: Amount::zero(CurrencyId::from("bitcoin-mainnet:__native__")),
            timestamp: None,
            target: Address("addr".into()),
        }
    }

    #[test]
    fn unsubmitted_sends_and_deleted_transfers_are_hidden() {
        assert!(!transfer(TransferState::Created, TransferDirection::Sent).is_visible());
        assert!(!transfer(TransferState::Signed, TransferDirection::Sent).is_visible());
        assert!(!transfer(TransferState::Deleted, TransferDirection::Received).is_visible());
        assert!(transfer(TransferState::Created, TransferDirection::Received).is_visible());
        assert!(transfer(TransferState::Submitted, TransferDirection::Sent).is_visible());
    }

    #[test]
    fn mode_serialization_is_stable() {
        for mode in WalletManagerMode::ALL {
            assert_eq!(WalletManagerMode::from_serialization(mode.serialization()), Some(mode));
        }
        assert_eq!(WalletManagerMode::P2pOnly.serialization(), 3);
        assert_eq!(WalletManagerMode::from_serialization(9), None);
    }

    #[test]
    fn hash_displays_as_hex() {
        let hash = TransferHash([0xab; 32]);
        assert!(hash.to_string().starts_with("0xabab"));
        assert_eq!(hash.to_string().len(), 66);
    }
}
