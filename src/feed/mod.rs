//! Editor event feed.
//!
//! Events arrive as JSON, either as lines on stdin or through the optional
//! HTTP ingest server, and are funnelled into one bounded channel.

pub mod reader;
pub mod types;

// Re-export commonly used types
pub use reader::{parse_line, EventFeed, FeedError, FEED_CAPACITY};
pub use types::{ContentChange, DocumentRef, EditorEvent, ProjectRef, NO_NAME_FILE, NO_PROJECT};
