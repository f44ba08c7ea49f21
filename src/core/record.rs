//! Per-project aggregation records and the payload they flush into.

use crate::core::classify::EditKind;
use crate::feed::NO_PROJECT;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Payload `type` tag expected by the plugin manager.
pub const PAYLOAD_TYPE: &str = "Events";

/// Plugin identifier reported with every payload.
pub const PLUGIN_ID: u32 = 2;

/// Shared cell holding the last known size of a file.
///
/// Zero means unknown. The size lookup holds a clone and writes into it
/// without touching the record map.
#[derive(Debug, Clone, Default)]
pub struct SizeSlot(Arc<AtomicU64>);

impl SizeSlot {
    pub fn set(&self, bytes: u64) {
        self.0.store(bytes, Ordering::Relaxed);
    }

    pub fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            bytes => Some(bytes),
        }
    }
}

/// Counters for one file within one flush window.
#[derive(Debug, Clone, Default)]
pub struct FileActivity {
    pub keystrokes: u64,
    pub pastes: u64,
    pub opens: u64,
    pub closes: u64,
    pub deletions: u64,
    size: SizeSlot,
}

impl FileActivity {
    /// Whether any counter is non-zero. The size snapshot does not count.
    pub fn has_activity(&self) -> bool {
        self.keystrokes > 0
            || self.pastes > 0
            || self.opens > 0
            || self.closes > 0
            || self.deletions > 0
    }

    pub fn file_size_bytes(&self) -> Option<u64> {
        self.size.get()
    }

    pub fn size_slot(&self) -> SizeSlot {
        self.size.clone()
    }

    fn to_payload(&self) -> FilePayload {
        FilePayload {
            keys: self.keystrokes,
            paste: self.pastes,
            open: self.opens,
            close: self.closes,
            delete: self.deletions,
            length: self.file_size_bytes().unwrap_or(0),
        }
    }
}

/// In-flight activity for one project.
#[derive(Debug, Clone)]
pub struct AggregationRecord {
    pub project_key: String,
    pub project_name: Option<String>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_keystrokes: u64,
    pub files: BTreeMap<String, FileActivity>,
}

impl AggregationRecord {
    /// Create an empty record whose window starts at `start`.
    pub fn new(
        project_key: impl Into<String>,
        project_name: Option<String>,
        start: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        Self {
            project_key: project_key.into(),
            project_name,
            window_start: start,
            window_end: start + window,
            total_keystrokes: 0,
            files: BTreeMap::new(),
        }
    }

    /// Whether any file under this record has a non-zero counter.
    pub fn has_activity(&self) -> bool {
        self.files.values().any(FileActivity::has_activity)
    }

    /// Get the activity entry for a file, creating a zeroed one on first touch.
    pub fn file_mut(&mut self, file: &str) -> &mut FileActivity {
        self.files.entry(file.to_string()).or_default()
    }

    pub fn file(&self, file: &str) -> Option<&FileActivity> {
        self.files.get(file)
    }

    /// Apply a classified edit to a file.
    pub fn apply_edit(&mut self, file: &str, kind: EditKind) {
        let activity = self.file_mut(file);
        match kind {
            EditKind::Paste(chars) => activity.pastes += chars,
            EditKind::Delete(chars) => activity.deletions += chars,
            EditKind::Keystroke => {
                activity.keystrokes += 1;
                self.total_keystrokes += 1;
            }
        }
    }

    pub fn record_open(&mut self, file: &str) {
        self.file_mut(file).opens += 1;
    }

    pub fn record_close(&mut self, file: &str) {
        self.file_mut(file).closes += 1;
    }

    /// Build the JSON payload the plugin manager expects.
    pub fn to_payload(&self, version: &str) -> KeystrokePayload {
        let project = if self.project_key == NO_PROJECT {
            None
        } else {
            Some(ProjectPayload {
                directory: self.project_key.clone(),
                name: self
                    .project_name
                    .clone()
                    .unwrap_or_else(|| self.project_key.clone()),
            })
        };

        KeystrokePayload {
            source: self
                .files
                .iter()
                .map(|(name, activity)| (name.clone(), activity.to_payload()))
                .collect(),
            payload_type: PAYLOAD_TYPE.to_string(),
            data: self.total_keystrokes.to_string(),
            start: self.window_start.timestamp(),
            end: self.window_end.timestamp(),
            project,
            plugin_id: PLUGIN_ID,
            version: version.to_string(),
        }
    }
}

/// Per-file metrics as sent on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub keys: u64,
    pub paste: u64,
    pub open: u64,
    pub close: u64,
    pub delete: u64,
    pub length: u64,
}

/// Project block of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPayload {
    pub directory: String,
    pub name: String,
}

/// Body of `POST /data` on the plugin manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystrokePayload {
    pub source: BTreeMap<String, FilePayload>,
    #[serde(rename = "type")]
    pub payload_type: String,
    /// Total keystrokes, string-encoded
    pub data: String,
    pub start: i64,
    pub end: i64,
    pub project: Option<ProjectPayload>,
    #[serde(rename = "pluginId")]
    pub plugin_id: u32,
    pub version: String,
}

impl KeystrokePayload {
    pub fn project_key(&self) -> &str {
        self.project
            .as_ref()
            .map(|p| p.directory.as_str())
            .unwrap_or(NO_PROJECT)
    }
}
