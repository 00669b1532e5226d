//! Per-currency connection mode preferences, persisted in the replicated `wallet-info` record.

use crate::catalog::CurrencyId;
use crate::engine::WalletManagerMode;
use crate::replica::{
	KvObject, ReplicaError, ReplicatedKvStore, SyncNotice, VersionedRecord, load_object,
	save_object,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const WALLET_INFO_CLASS_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WalletConnectionInfo {
	pub class_version: u32,
	pub name: String,
	pub creation_date: Option<DateTime<Utc>>,
	/// Native currency uid to serialized [`WalletManagerMode`].
	pub connection_modes: HashMap<CurrencyId, u8>,
}

impl Default for WalletConnectionInfo {
	fn default() -> Self {
		Self {
			class_version: WALLET_INFO_CLASS_VERSION,
			name: String::new(),
			creation_date: None,
			connection_modes: HashMap::new(),
		}
	}
}

impl KvObject for WalletConnectionInfo {
	const KEY: &'static str = "wallet-info";
}

pub struct WalletConnectionSettings {
	store: Arc<dyn ReplicatedKvStore>,
	info: VersionedRecord<WalletConnectionInfo>,
}

impl WalletConnectionSettings {
	pub async fn load(store: Arc<dyn ReplicatedKvStore>) -> Self {
		let empty = || {
			VersionedRecord::new_unsaved(WalletConnectionInfo::KEY, WalletConnectionInfo::default())
		};
		let info = match load_object::<WalletConnectionInfo>(store.as_ref()).await {
			Ok(Some(record)) => {
				debug!("Loaded wallet info version {}", record.version);
				record
			}
			Ok(None) => empty(),
			Err(e) => {
				warn!("Unable to load wallet info: {}", e);
				empty()
			}
		};
		Self { store, info }
	}

	/// Base-layer bitcoin chains default to peer-to-peer, everything else to the API.
	pub fn default_mode(uid: &CurrencyId) -> WalletManagerMode {
		match uid.network_id().split('-').next() {
			Some("bitcoin") | Some("bitcoincash") => WalletManagerMode::P2pOnly,
			_ => WalletManagerMode::ApiOnly,
		}
	}

	/// The stored mode, if any, without validation.
	pub fn stored_mode(&self, uid: &CurrencyId) -> Option<WalletManagerMode> {
		self.info
			.value
			.connection_modes
			.get(uid)
			.and_then(|v| WalletManagerMode::from_serialization(*v))
	}

	/// Forget a stored mode that does not decode or that `supported` rejects.
	/// Returns true if an entry was removed.
	pub fn sanitize(
		&mut self,
		uid: &CurrencyId,
		supported: impl Fn(WalletManagerMode) -> bool,
	) -> bool {
		let Some(value) = self.info.value.connection_modes.get(uid).copied() else {
			return false;
		};
		let valid = WalletManagerMode::from_serialization(value).is_some_and(&supported);
		if !valid {
			warn!("Discarding unsupported connection mode {} for {}", value, uid);
			self.info.value.connection_modes.remove(uid);
		}
		!valid
	}

	/// The mode to use for `uid`. When nothing usable is stored the default is
	/// recorded and persisted.
	pub async fn mode(
		&mut self,
		uid: &CurrencyId,
		supported: impl Fn(WalletManagerMode) -> bool,
	) -> WalletManagerMode {
		self.sanitize(uid, supported);
		if let Some(mode) = self.stored_mode(uid) {
			return mode;
		}
		let mode = Self::default_mode(uid);
		info!("Setting default connection mode for {}: {}", uid, mode);
		self.info
			.value
			.connection_modes
			.insert(uid.clone(), mode.serialization());
		if let Err(e) = self.save().await {
			warn!("Error saving wallet info: {}", e);
		}
		mode
	}

	pub async fn set(
		&mut self,
		mode: WalletManagerMode,
		uid: &CurrencyId,
	) -> Result<(), ReplicaError> {
		self.info
			.value
			.connection_modes
			.insert(uid.clone(), mode.serialization());
		self.save().await
	}

	async fn save(&mut self) -> Result<(), ReplicaError> {
		let record = save_object(self.store.as_ref(), &self.info.value, self.info.version).await?;
		self.info = record;
		Ok(())
	}

	pub fn version(&self) -> u64 {
		self.info.version
	}

	/// Adopt a strictly newer `wallet-info` record after a remote sync.
	/// Returns true if the stored modes were replaced.
	pub async fn apply_sync_notice(&mut self, notice: &SyncNotice) -> Result<bool, ReplicaError> {
		if !notice.touches(WalletConnectionInfo::KEY) {
			return Ok(false);
		}
		let Some(remote) = load_object::<WalletConnectionInfo>(self.store.as_ref()).await? else {
			return Ok(false);
		};
		if remote.version <= self.info.version {
			debug!("Remote wallet info version {} is not newer", remote.version);
			return Ok(false);
		}
		info!("Adopting remote wallet info version {}", remote.version);
		self.info = remote;
		Ok(true)
	}
}
