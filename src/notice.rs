//! One-time warning when the plugin manager cannot be reached.

use crate::delivery::DeliveryError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Message shown to the user on the first failed delivery.
pub const DELIVERY_FAILURE_MESSAGE: &str = "We are having trouble sending data to the plugin manager. \
     Please make sure the Plugin Manager is running and logged on.";

/// Surface for messages the user should actually see.
pub trait UserNotifier: Send + Sync {
    fn warn_user(&self, message: &str);
}

/// Prints warnings to stderr, which the editor shows in its output panel.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrNotifier;

impl UserNotifier for StderrNotifier {
    fn warn_user(&self, message: &str) {
        eprintln!("Warning: {message}");
    }
}

/// Latch that lets only the first delivery failure reach the user.
pub struct FailureNotice {
    shown: AtomicBool,
    notifier: Arc<dyn UserNotifier>,
}

impl FailureNotice {
    pub fn new(notifier: Arc<dyn UserNotifier>) -> Self {
        Self {
            shown: AtomicBool::new(false),
            notifier,
        }
    }

    /// Record a failed delivery. Returns true if the user was warned.
    pub fn report(&self, error: &DeliveryError) -> bool {
        let first = !self.shown.swap(true, Ordering::SeqCst);
        if first {
            tracing::error!("Unable to send keystroke data: {}", error);
            self.notifier.warn_user(DELIVERY_FAILURE_MESSAGE);
        } else {
            tracing::warn!("Unable to send keystroke data: {}", error);
        }
        first
    }

    /// Whether the warning has been shown.
    pub fn was_shown(&self) -> bool {
        self.shown.load(Ordering::SeqCst)
    }

    /// Re-arm the latch.
    pub fn reset(&self) {
        self.shown.store(false, Ordering::SeqCst);
    }
}

impl Default for FailureNotice {
    fn default() -> Self {
        Self::new(Arc::new(StderrNotifier))
    }
}
