//! Core functionality for the keystroke agent.
//!
//! This module contains:
//! - Edit classification (paste / delete / keystroke)
//! - Per-project aggregation records and their wire payload
//! - The live project table that events are folded into
//! - Best-effort file size snapshots

pub mod aggregator;
pub mod classify;
pub mod file_size;
pub mod record;

// Re-export commonly used types
pub use aggregator::{Aggregator, Drained, EventOutcome};
pub use classify::{classify, classify_changes, net_magnitude, EditKind};
pub use file_size::{BlockingSizeProbe, FileSizeProbe, TokioSizeProbe};
pub use record::{
    AggregationRecord, FileActivity, FilePayload, KeystrokePayload, ProjectPayload, SizeSlot,
    PAYLOAD_TYPE, PLUGIN_ID,
};
