//! Session activity statistics.
//!
//! Counts what the agent did with the events it received: how many were
//! folded into records, how many were ignored, and how flushes ended. Only
//! counts are kept, never file names or content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current agent session.
#[derive(Debug)]
pub struct ActivityStats {
    /// Events that changed a record
    events_counted: AtomicU64,
    /// Untitled buffers, cursor moves and other no-ops
    events_ignored: AtomicU64,
    /// Records accepted by the plugin manager
    records_delivered: AtomicU64,
    /// Records the plugin manager did not accept
    records_failed: AtomicU64,
    /// Empty records dropped at flush time
    records_discarded: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl ActivityStats {
    pub fn new() -> Self {
        Self {
            events_counted: AtomicU64::new(0),
            events_ignored: AtomicU64::new(0),
            records_delivered: AtomicU64::new(0),
            records_failed: AtomicU64::new(0),
            records_discarded: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create stats that continue from, and save back to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous activity stats: {}", e);
        }

        stats
    }

    pub fn record_event_counted(&self) {
        self.events_counted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.records_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.records_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self, count: u64) {
        self.records_discarded.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_counted: self.events_counted.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            records_discarded: self.records_discarded.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start)
                .num_seconds()
                .max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Events counted: {}\n\
             - Events ignored: {}\n\
             - Records delivered: {}\n\
             - Records failed: {}\n\
             - Empty records discarded: {}\n\
             - Session duration: {} seconds",
            stats.events_counted,
            stats.events_ignored,
            stats.records_delivered,
            stats.records_failed,
            stats.records_discarded,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                events_counted: stats.events_counted,
                events_ignored: stats.events_ignored,
                records_delivered: stats.records_delivered,
                records_failed: stats.records_failed,
                records_discarded: stats.records_discarded,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let persisted = read_persisted(path)?;
                self.events_counted
                    .store(persisted.events_counted, Ordering::Relaxed);
                self.events_ignored
                    .store(persisted.events_ignored, Ordering::Relaxed);
                self.records_delivered
                    .store(persisted.records_delivered, Ordering::Relaxed);
                self.records_failed
                    .store(persisted.records_failed, Ordering::Relaxed);
                self.records_discarded
                    .store(persisted.records_discarded, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for ActivityStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub events_counted: u64,
    pub events_ignored: u64,
    pub records_delivered: u64,
    pub records_failed: u64,
    pub records_discarded: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedStats {
    pub events_counted: u64,
    pub events_ignored: u64,
    pub records_delivered: u64,
    pub records_failed: u64,
    pub records_discarded: u64,
    pub last_updated: DateTime<Utc>,
}

/// Read stats saved by a previous session.
pub fn read_persisted(path: &std::path::Path) -> Result<PersistedStats, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(std::io::Error::other)
}

/// Thread-safe shared stats.
pub type SharedStats = Arc<ActivityStats>;
