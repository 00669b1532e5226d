use crate::catalog::{CurrencyId, CurrencyMetaData, TokenType};
use crate::engine::{EngineCurrency, Network, Unit};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// A currency on a specific network, combining the engine's view with catalog metadata.
///
/// Built once per network-currency pair when the network is added and never mutated.
#[derive(Debug, Clone)]
pub struct Currency {
	pub uid: CurrencyId,
	pub code: String,
	pub name: String,
	pub token_type: TokenType,
	/// Smallest divisible unit (e.g. satoshi).
	pub base_unit: Unit,
	/// Unit used for display and exchange rates (e.g. bitcoin).
	pub default_unit: Unit,
	/// All units keyed by lowercase name.
	units: HashMap<String, Unit>,
	pub metadata: CurrencyMetaData,
	pub network_id: String,
}

impl Currency {
	/// Returns `None` when the uids disagree or the network has no unit set for the currency.
	pub fn new(core: &EngineCurrency, network: &Network, metadata: CurrencyMetaData) -> Option<Self> {
		if core.uid != metadata.uid {
			return None;
		}
		let units = network.units_for(&core.uid)?;
		Some(Self {
			uid: core.uid.clone(),
			code: core.code.to_uppercase(),
			name: metadata.name.clone(),
			token_type: core.token_type,
			base_unit: units.base.clone(),
			default_unit: units.default.clone(),
			units: units
				.all
				.iter()
				.map(|u| (u.name.to_lowercase(), u.clone()))
				.collect(),
			metadata,
			network_id: network.id.clone(),
		})
	}

	pub fn unit_named(&self, name: &str) -> Option<&Unit> {
		self.units.get(&name.to_lowercase())
	}

	pub fn unit_for_decimals(&self, decimals: u8) -> Option<&Unit> {
		self.units.values().find(|u| u.decimals == decimals)
	}

	/// Display name of a unit; the default unit is shown as the ticker code.
	pub fn name_for_unit(&self, unit: &Unit) -> String {
		if unit.decimals == self.default_unit.decimals {
			self.code.clone()
		} else {
			unit.name.clone()
		}
	}

	pub fn is_supported(&self) -> bool {
		self.metadata.is_supported
	}

	pub fn token_address(&self) -> Option<&str> {
		self.metadata.token_address.as_deref()
	}

	pub fn is_native(&self) -> bool {
		self.token_type == TokenType::Native
	}
}

impl PartialEq for Currency {
	fn eq(&self, other: &Self) -> bool {
		self.uid == other.uid
	}
}

impl Eq for Currency {}

impl Hash for Currency {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.uid.hash(state);
	}
}
