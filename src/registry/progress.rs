//! Progress tracking for wallet manager synchronization.
//!
//! This module provides the `SyncProgressTracker`, which records sync sessions per network as
//! reported by manager events: when a sync started, how far it got, the latest block height, and
//! how sessions ended. It logs progress at coarse intervals and produces per-network summaries.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{info, warn};

/// Percent points between two progress log lines
const LOG_INTERVAL_PERCENT: f64 = 10.0;

/// Progress of one network's sync sessions
#[derive(Debug, Clone, Default)]
struct NetworkProgress {
    /// When the running session started, if one is running
    started_at: Option<DateTime<Utc>>,
    /// Last reported percent complete
    percent: f64,
    /// Timestamp of the last block the engine reported progress for
    last_block_timestamp: Option<DateTime<Utc>>,
    /// Highest block height seen
    highest_block: u64,
    /// Progress events received in the running session
    progress_updates: usize,
    completed_syncs: usize,
    failed_syncs: usize,
    /// Percent at which we last logged
    last_logged_percent: f64,
}

/// Tracks synchronization progress across networks
#[derive(Debug, Clone, Default)]
pub struct SyncProgressTracker {
    networks: HashMap<String, NetworkProgress>,
}

impl SyncProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of a sync session
    pub fn record_started(&mut self, network_id: &str) {
        let progress = self.networks.entry(network_id.to_string()).or_default();
        progress.started_at = Some(Utc::now());
        progress.percent = 0.0;
        progress.progress_updates = 0;
        progress.last_logged_percent = 0.0;
        info!("Sync started for {}", network_id);
    }

    /// Record a progress report, logging every few percent
    pub fn record_progress(
        &mut self,
        network_id: &str,
        percent: f64,
        timestamp: Option<DateTime<Utc>>,
    ) {
        let progress = self.networks.entry(network_id.to_string()).or_default();
        progress.percent = percent.clamp(0.0, 100.0);
        progress.progress_updates += 1;
        if timestamp.is_some() {
            progress.last_block_timestamp = timestamp;
        }
        if progress.percent - progress.last_logged_percent >= LOG_INTERVAL_PERCENT {
            info!("Sync progress for {}: {:.1}%", network_id, progress.percent);
            progress.last_logged_percent = progress.percent;
        }
    }

    pub fn record_block(&mut self, network_id: &str, height: u64) {
        let progress = self.networks.entry(network_id.to_string()).or_default();
        progress.highest_block = progress.highest_block.max(height);
    }

    /// Record the end of a session and log its summary
    pub fn record_ended(&mut self, network_id: &str, error: Option<&str>) {
        let progress = self.networks.entry(network_id.to_string()).or_default();
        match error {
            None => {
                progress.completed_syncs += 1;
                progress.percent = 100.0;
            }
            Some(e) => {
                progress.failed_syncs += 1;
                warn!("Sync for {} ended with error: {}", network_id, e);
            }
        }
        if let Some(stats) = self.get_stats(network_id) {
            info!("{}", stats.summary());
        }
        if let Some(progress) = self.networks.get_mut(network_id) {
            progress.started_at = None;
        }
    }

    pub fn is_syncing(&self, network_id: &str) -> bool {
        self.networks
            .get(network_id)
            .is_some_and(|p| p.started_at.is_some())
    }

    /// Get sync statistics for one network
    pub fn get_stats(&self, network_id: &str) -> Option<SyncStats> {
        self.networks.get(network_id).map(|p| SyncStats {
            network_id: network_id.to_string(),
            started_at: p.started_at,
            percent: p.percent,
            last_block_timestamp: p.last_block_timestamp,
            highest_block: p.highest_block,
            progress_updates: p.progress_updates,
            completed_syncs: p.completed_syncs,
            failed_syncs: p.failed_syncs,
        })
    }

    pub fn clear(&mut self) {
        self.networks.clear();
    }
}

/// Statistics about one network's sync progress
#[derive(Debug, Clone)]
pub struct SyncStats {
    pub network_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub percent: f64,
    pub last_block_timestamp: Option<DateTime<Utc>>,
    pub highest_block: u64,
    pub progress_updates: usize,
    pub completed_syncs: usize,
    pub failed_syncs: usize,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        let elapsed = self
            .started_at
            .map(|s| format!(" in {}s", (Utc::now() - s).num_seconds()))
            .unwrap_or_default();
        format!(
            "Sync {} at {:.1}%{}: block {}, {} progress updates, {} completed, {} failed",
            self.network_id,
            self.percent,
            elapsed,
            self.highest_block,
            self.progress_updates,
            self.completed_syncs,
            self.failed_syncs
        )
    }
}
