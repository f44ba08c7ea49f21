//! Live project -> record table.
//!
//! Editor events are classified and folded into one [`AggregationRecord`] per
//! project. A flush drains the whole table: active records are handed back for
//! delivery, empty ones are dropped.

use crate::core::classify::{classify_changes, EditKind};
use crate::core::file_size::{is_probeable, FileSizeProbe};
use crate::core::record::AggregationRecord;
use crate::feed::{DocumentRef, EditorEvent, ProjectRef, NO_PROJECT};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// What happened to an incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Opened,
    Closed,
    Edited(EditKind),
    /// Untitled buffer, cursor move, or any other change with no net effect
    Ignored,
}

/// Result of draining the table.
#[derive(Debug, Default)]
pub struct Drained {
    /// Records with activity, ready for delivery
    pub ready: Vec<AggregationRecord>,
    /// Number of empty records that were dropped
    pub discarded: usize,
}

/// Owns every in-flight aggregation record.
pub struct Aggregator {
    /// Length of a flush window
    window: Duration,
    records: HashMap<String, AggregationRecord>,
    size_probe: Option<Arc<dyn FileSizeProbe>>,
}

impl Aggregator {
    /// Create an empty aggregator with the given flush window.
    pub fn new(window_secs: u64) -> Self {
        Self {
            window: Duration::seconds(window_secs.min(u64::from(u32::MAX)) as i64),
            records: HashMap::new(),
            size_probe: None,
        }
    }

    /// Attach a probe used to snapshot file sizes on every touch.
    pub fn with_size_probe(mut self, probe: Arc<dyn FileSizeProbe>) -> Self {
        self.size_probe = Some(probe);
        self
    }

    /// Process an incoming editor event.
    pub fn handle_event(&mut self, event: &EditorEvent) -> EventOutcome {
        self.handle_event_at(event, Utc::now())
    }

    /// Process an event as if it arrived at `now`.
    pub fn handle_event_at(&mut self, event: &EditorEvent, now: DateTime<Utc>) -> EventOutcome {
        let document = event.document();
        if document.is_untitled {
            return EventOutcome::Ignored;
        }

        match event {
            EditorEvent::Open { project, .. } => {
                let file = document.file_key();
                self.touch(project.as_ref(), document, now).record_open(file);
                tracing::debug!("file opened: {}", file);
                EventOutcome::Opened
            }
            EditorEvent::Close { project, .. } => {
                let file = document.file_key();
                self.touch(project.as_ref(), document, now).record_close(file);
                tracing::debug!("file closed: {}", file);
                EventOutcome::Closed
            }
            EditorEvent::Change {
                project, changes, ..
            } => {
                // Classify first so a no-op never creates a record.
                let Some(kind) = classify_changes(changes) else {
                    return EventOutcome::Ignored;
                };
                let file = document.file_key();
                self.touch(project.as_ref(), document, now)
                    .apply_edit(file, kind);
                tracing::debug!("{:?} in {}", kind, file);
                EventOutcome::Edited(kind)
            }
        }
    }

    /// Resolve the record for a project, creating it lazily, make sure the
    /// file has an entry, and kick off a size snapshot for it.
    fn touch(
        &mut self,
        project: Option<&ProjectRef>,
        document: &DocumentRef,
        now: DateTime<Utc>,
    ) -> &mut AggregationRecord {
        let (key, name) = project_key(project);
        let window = self.window;
        let record = self
            .records
            .entry(key.clone())
            .or_insert_with(|| AggregationRecord::new(key, name, now, window));

        let file = document.file_key();
        let slot = record.file_mut(file).size_slot();
        if let Some(probe) = &self.size_probe {
            if is_probeable(file) {
                probe.request(PathBuf::from(file), slot);
            }
        }
        record
    }

    /// Remove every record, returning those with activity.
    pub fn drain(&mut self) -> Drained {
        let mut drained = Drained::default();
        for (_, record) in self.records.drain() {
            if record.has_activity() {
                drained.ready.push(record);
            } else {
                drained.discarded += 1;
            }
        }
        drained
    }

    pub fn record(&self, project_key: &str) -> Option<&AggregationRecord> {
        self.records.get(project_key)
    }

    pub fn records(&self) -> impl Iterator<Item = &AggregationRecord> {
        self.records.values()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Map key and display name for an event's project.
fn project_key(project: Option<&ProjectRef>) -> (String, Option<String>) {
    match project {
        Some(p) if !p.directory.is_empty() => (
            p.directory.clone(),
            Some(p.name.clone().unwrap_or_else(|| p.directory.clone())),
        ),
        _ => (NO_PROJECT.to_string(), Some(NO_PROJECT.to_string())),
    }
}
