//! Working copy of the user's enabled asset list.
//!
//! An [`AssetCollection`] pairs the full catalog with the replicated [`AssetIndex`].
//! Edits are applied to an in-memory list and only reach the replica through
//! [`AssetCollection::save_changes`]. The last record returned by the replica is
//! kept as the baseline that `revert_changes` restores and that remote updates are
//! compared against.

use super::index::{AssetIndex, LegacyAssetIndex, default_currency_ids, migrate_legacy};
use super::types::{AssetCollectionError, RemoteSyncOutcome};
use crate::catalog::{CurrencyCatalog, CurrencyId, CurrencyMetaData};
use crate::config::NetworkClass;
use crate::replica::{
    KvObject, ReplicaError, ReplicaSyncListener, ReplicatedKvStore, SyncNotice, VersionedRecord,
    load_object, save_object,
};
use itertools::Itertools;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct AssetCollection {
    all_assets: CurrencyCatalog,
    enabled_assets: Vec<CurrencyMetaData>,
    has_unsaved_changes: bool,
    store: Arc<dyn ReplicatedKvStore>,
    asset_index: VersionedRecord<AssetIndex>,
    network_class: NetworkClass,
    changes: watch::Sender<Vec<CurrencyId>>,
}

impl AssetCollection {
    /// Build the collection from the replica. Catalog entries of the other network
    /// class are ignored.
    ///
    /// Tries the current index, then a legacy index, then the defaults. An empty index
    /// is replaced by the defaults. Indices created here are written back; write
    /// failures are logged and the collection continues with an unsaved baseline.
    pub async fn load(
        store: Arc<dyn ReplicatedKvStore>,
        all_assets: CurrencyCatalog,
        network_class: NetworkClass,
    ) -> Self {
        let all_assets = all_assets.for_network_class(network_class);
        let existing = match load_object::<AssetIndex>(store.as_ref()).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Unable to load asset index: {}", e);
                None
            }
        };

        let mut asset_index = match existing {
            Some(record) => {
                debug!("Loaded asset index version {}", record.version);
                record
            }
            None => match Self::migrate_from_legacy(store.as_ref(), &all_assets, network_class).await {
                Some(record) => record,
                None => Self::create_index(store.as_ref(), network_class).await,
            },
        };

        if asset_index.value.enabled_asset_ids.is_empty() {
            info!("Asset index is empty, creating new index");
            asset_index = Self::create_index(store.as_ref(), network_class).await;
        }

        let (changes, _) = watch::channel(asset_index.value.enabled_asset_ids.clone());
        let mut collection = Self {
            all_assets,
            enabled_assets: Vec::new(),
            has_unsaved_changes: false,
            store,
            asset_index,
            network_class,
            changes,
        };
        collection.rebuild_from_baseline();
        info!(
            "Asset collection initialized, enabled assets: {}",
            collection.enabled_assets.iter().map(|a| a.code.as_str()).join(", ")
        );
        collection
    }

    async fn migrate_from_legacy(
        store: &dyn ReplicatedKvStore,
        all_assets: &CurrencyCatalog,
        network_class: NetworkClass,
    ) -> Option<VersionedRecord<AssetIndex>> {
        let legacy = match load_object::<LegacyAssetIndex>(store).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!("Unable to load legacy asset index: {}", e);
                return None;
            }
        };
        info!("Migrating legacy asset index ({} entries)", legacy.value.enabled_currencies.len());
        let index = migrate_legacy(&legacy.value, all_assets, network_class);
        Some(Self::persist_new(store, index).await)
    }

    async fn create_index(
        store: &dyn ReplicatedKvStore,
        network_class: NetworkClass,
    ) -> VersionedRecord<AssetIndex> {
        info!("Creating new asset index");
        Self::persist_new(store, AssetIndex::with_defaults(network_class)).await
    }

    async fn persist_new(
        store: &dyn ReplicatedKvStore,
        index: AssetIndex,
    ) -> VersionedRecord<AssetIndex> {
        match save_object(store, &index, 0).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to save new asset index: {}", e);
                VersionedRecord::new_unsaved(AssetIndex::KEY, index)
            }
        }
    }

    /// Resolve the baseline ids against the catalog. Duplicates and unknown uids are
    /// dropped and mark the collection dirty.
    fn rebuild_from_baseline(&mut self) {
        let mut seen = HashSet::new();
        let mut sanitized = false;
        let mut enabled = Vec::with_capacity(self.asset_index.value.enabled_asset_ids.len());
        for uid in &self.asset_index.value.enabled_asset_ids {
            if !seen.insert(uid.clone()) {
                warn!("Dropping duplicate asset {} from asset index", uid);
                sanitized = true;
                continue;
            }
            match self.all_assets.get(uid) {
                Some(meta) => enabled.push(meta.clone()),
                None => {
                    warn!("Dropping unknown asset {} from asset index", uid);
                    sanitized = true;
                }
            }
        }
        self.enabled_assets = enabled;
        self.has_unsaved_changes = sanitized;
    }

    fn resolve(&self, uid: &CurrencyId) -> Result<&CurrencyMetaData, AssetCollectionError> {
        self.all_assets
            .get(uid)
            .ok_or_else(|| AssetCollectionError::UnknownAsset(uid.clone()))
    }

    pub fn all_assets(&self) -> &CurrencyCatalog {
        &self.all_assets
    }

    pub fn enabled_assets(&self) -> &[CurrencyMetaData] {
        &self.enabled_assets
    }

    pub fn enabled_ids(&self) -> Vec<CurrencyId> {
        self.enabled_assets.iter().map(|a| a.uid.clone()).collect()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.has_unsaved_changes
    }

    /// Replica version of the baseline record.
    pub fn index_version(&self) -> u64 {
        self.asset_index.version
    }

    pub fn is_enabled(&self, uid: &CurrencyId) -> bool {
        self.enabled_assets.iter().any(|a| &a.uid == uid)
    }

    pub fn display_order(&self, uid: &CurrencyId) -> Option<usize> {
        self.enabled_assets.iter().position(|a| &a.uid == uid)
    }

    /// Supported assets that are not enabled, preferred currencies first, then by code.
    pub fn available_assets(&self) -> Vec<CurrencyMetaData> {
        self.all_assets
            .iter()
            .filter(|a| a.is_supported && !self.is_enabled(&a.uid))
            .sorted_by(|a, b| {
                b.is_preferred()
                    .cmp(&a.is_preferred())
                    .then_with(|| a.code.cmp(&b.code))
            })
            .cloned()
            .collect()
    }

    pub fn available_asset(&self, at: usize) -> Option<CurrencyMetaData> {
        self.available_assets().into_iter().nth(at)
    }

    /// Observe the enabled id list after each save or remote replacement.
    pub fn subscribe(&self) -> watch::Receiver<Vec<CurrencyId>> {
        self.changes.subscribe()
    }

    pub fn add(&mut self, uid: &CurrencyId) -> Result<(), AssetCollectionError> {
        if self.is_enabled(uid) {
            return Err(AssetCollectionError::AlreadyEnabled(uid.clone()));
        }
        let meta = self.resolve(uid)?.clone();
        self.enabled_assets.push(meta);
        self.has_unsaved_changes = true;
        Ok(())
    }

    pub fn remove(&mut self, uid: &CurrencyId) -> Result<(), AssetCollectionError> {
        let index = self
            .display_order(uid)
            .ok_or_else(|| AssetCollectionError::NotEnabled(uid.clone()))?;
        self.remove_asset_at(index).map(|_| ())
    }

    pub fn remove_asset_at(
        &mut self,
        index: usize,
    ) -> Result<CurrencyMetaData, AssetCollectionError> {
        if index >= self.enabled_assets.len() {
            return Err(AssetCollectionError::IndexOutOfBounds {
                index,
                len: self.enabled_assets.len(),
            });
        }
        self.has_unsaved_changes = true;
        Ok(self.enabled_assets.remove(index))
    }

    pub fn move_asset(&mut self, from: usize, to: usize) -> Result<(), AssetCollectionError> {
        let len = self.enabled_assets.len();
        for index in [from, to] {
            if index >= len {
                return Err(AssetCollectionError::IndexOutOfBounds { index, len });
            }
        }
        let asset = self.enabled_assets.remove(from);
        self.enabled_assets.insert(to, asset);
        self.has_unsaved_changes = true;
        Ok(())
    }

    /// Replace the working copy with the default assets. Nothing is written until saved.
    pub fn reset_to_default_collection(&mut self) {
        self.enabled_assets = default_currency_ids(self.network_class)
            .iter()
            .filter_map(|uid| self.all_assets.get(uid).cloned())
            .collect();
        self.has_unsaved_changes = true;
    }

    /// Discard unsaved edits.
    pub fn revert_changes(&mut self) {
        self.rebuild_from_baseline();
        self.has_unsaved_changes = false;
    }

    /// Write the working copy if it has unsaved edits.
    ///
    /// Returns `Ok(false)` when there was nothing to save. On failure the edits stay
    /// pending and the baseline is unchanged.
    pub async fn save_changes(&mut self) -> Result<bool, ReplicaError> {
        if !self.has_unsaved_changes {
            return Ok(false);
        }
        let index = AssetIndex::new(self.enabled_ids());
        let record = save_object(self.store.as_ref(), &index, self.asset_index.version).await?;
        debug!("Saved asset index version {}", record.version);

        self.asset_index = record;
        self.has_unsaved_changes = false;
        self.changes.send_replace(self.enabled_ids());
        Ok(true)
    }

    /// Reconcile with the replica after a remote sync. A strictly newer remote version
    /// replaces the baseline and the working copy, discarding unsaved local edits.
    pub async fn handle_replica_synced(&mut self) -> Result<RemoteSyncOutcome, ReplicaError> {
        let Some(remote) = load_object::<AssetIndex>(self.store.as_ref()).await? else {
            return Ok(RemoteSyncOutcome::Unchanged);
        };
        if remote.version <= self.asset_index.version {
            return Ok(RemoteSyncOutcome::Unchanged);
        }

        let discarded_local_edits = self.has_unsaved_changes;
        if discarded_local_edits {
            warn!(
                "Remote asset index version {} replaces unsaved local edits (local version {})",
                remote.version, self.asset_index.version
            );
        } else {
            info!("Adopting remote asset index version {}", remote.version);
        }

        self.asset_index = remote;
        self.rebuild_from_baseline();
        self.changes.send_replace(self.enabled_ids());
        Ok(RemoteSyncOutcome::Replaced { discarded_local_edits })
    }

    /// Reconcile if `notice` concerns the asset index.
    pub async fn apply_sync_notice(
        &mut self,
        notice: &SyncNotice,
    ) -> Result<RemoteSyncOutcome, ReplicaError> {
        if !notice.touches(AssetIndex::KEY) {
            return Ok(RemoteSyncOutcome::Unchanged);
        }
        self.handle_replica_synced().await
    }

    /// Follow remote syncs until the store goes away. Failed reconciliations are logged
    /// and the next notification retries.
    pub async fn watch_replica(&mut self, mut listener: ReplicaSyncListener) {
        while let Some(notice) = listener.next().await {
            if let Err(e) = self.apply_sync_notice(&notice).await {
                warn!("Error reconciling asset index: {}", e);
            }
        }
        debug!("Replica sync listener closed");
    }
}
