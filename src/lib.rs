//! Keystroke Agent - per-project editing activity for editor plugins.
//!
//! The agent receives document open/close/change notifications from an
//! editor, folds them into one aggregation record per project, and every
//! flush interval posts the records that saw activity to the local plugin
//! manager.
//!
//! # What is counted
//!
//! - **Keystrokes**: single-character inserts
//! - **Pastes**: characters inserted in bulk (more than one at a time)
//! - **Deletions**: characters removed
//! - **Opens / closes** per file
//!
//! Text content is never received; events carry lengths only.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Keystroke Agent                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌─────────────┐   ┌──────────────┐         │
//! │  │    Feed    │──▶│ Aggregator  │──▶│ FlushScheduler│        │
//! │  │(stdin/HTTP)│   │ (per proj.) │   │   (60s tick)  │        │
//! │  └────────────┘   └─────────────┘   └──────────────┘         │
//! │                          │                  │                 │
//! │                          ▼                  ▼                 │
//! │                   ┌─────────────┐   ┌──────────────┐         │
//! │                   │  File size  │   │CompanionClient│        │
//! │                   │  snapshots  │   │ (POST /data)  │        │
//! │                   └─────────────┘   └──────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use keystroke_agent::core::Aggregator;
//! use keystroke_agent::feed::{ContentChange, DocumentRef, EditorEvent, ProjectRef};
//!
//! let mut aggregator = Aggregator::new(60);
//! aggregator.handle_event(&EditorEvent::Change {
//!     document: DocumentRef::file("/work/app/src/main.rs"),
//!     project: Some(ProjectRef::new("/work/app")),
//!     changes: vec![ContentChange::insert(1)],
//! });
//!
//! let record = aggregator.record("/work/app").unwrap();
//! assert_eq!(record.total_keystrokes, 1);
//! ```

pub mod config;
pub mod core;
pub mod delivery;
pub mod feed;
pub mod notice;
pub mod scheduler;
pub mod stats;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use self::core::{
    AggregationRecord, Aggregator, EditKind, EventOutcome, FileActivity, KeystrokePayload,
};
pub use delivery::{CompanionClient, CompanionConfig, DeliveryError, DeliverySink};
pub use feed::{EditorEvent, EventFeed, FeedError};
pub use notice::{FailureNotice, StderrNotifier, UserNotifier};
pub use scheduler::{FlushScheduler, KeystrokeService};
pub use stats::{ActivityStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
