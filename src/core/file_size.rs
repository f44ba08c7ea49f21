//! Best-effort file size snapshots.
//!
//! Size lookups run off the classification path and write into the
//! [`SizeSlot`] of the file entry that was current when they were requested.
//! Failures are swallowed.

use crate::core::record::SizeSlot;
use crate::feed::NO_NAME_FILE;
use std::path::PathBuf;

/// Something that can look up a file's size without blocking the caller.
pub trait FileSizeProbe: Send + Sync {
    /// Start a lookup for `path`, storing the result in `slot` if it succeeds.
    fn request(&self, path: PathBuf, slot: SizeSlot);
}

/// Whether a file name is worth a size lookup at all.
pub fn is_probeable(file: &str) -> bool {
    !file.is_empty() && file != NO_NAME_FILE
}

/// Probe that spawns `tokio::fs::metadata` on a runtime.
#[derive(Debug, Clone)]
pub struct TokioSizeProbe {
    handle: tokio::runtime::Handle,
}

impl TokioSizeProbe {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl FileSizeProbe for TokioSizeProbe {
    fn request(&self, path: PathBuf, slot: SizeSlot) {
        self.handle.spawn(async move {
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.len() > 0 => slot.set(meta.len()),
                Ok(_) => {}
                Err(e) => tracing::debug!("size lookup failed for {}: {}", path.display(), e),
            }
        });
    }
}

/// Probe that stats synchronously on the calling thread.
///
/// Handy when no runtime is around, e.g. in tests and one-shot tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingSizeProbe;

impl FileSizeProbe for BlockingSizeProbe {
    fn request(&self, path: PathBuf, slot: SizeSlot) {
        if let Ok(meta) = std::fs::metadata(&path) {
            if meta.len() > 0 {
                slot.set(meta.len());
            }
        }
    }
}
