//! Periodic flushing of aggregation records.
//!
//! [`KeystrokeService`] owns the shared aggregator and knows how to flush it;
//! [`FlushScheduler`] drives that flush from a repeating tokio timer. Each
//! delivery runs on its own task so a slow or dead plugin manager never
//! holds up a tick.

use crate::core::{Aggregator, EventOutcome};
use crate::delivery::DeliverySink;
use crate::feed::EditorEvent;
use crate::notice::FailureNotice;
use crate::stats::SharedStats;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Bounds applied to the flush period. A zero period would panic the timer
/// and a huge one would overflow the first deadline.
const MIN_PERIOD: Duration = Duration::from_millis(1);
const MAX_PERIOD: Duration = Duration::from_secs(crate::config::MAX_FLUSH_SECS);

/// Shared state between event intake and the flush timer.
pub struct KeystrokeService<S: DeliverySink> {
    aggregator: Mutex<Aggregator>,
    sink: Arc<S>,
    notice: Arc<FailureNotice>,
    stats: SharedStats,
    version: String,
}

impl<S: DeliverySink> KeystrokeService<S> {
    pub fn new(
        aggregator: Aggregator,
        sink: Arc<S>,
        notice: Arc<FailureNotice>,
        stats: SharedStats,
    ) -> Self {
        Self {
            aggregator: Mutex::new(aggregator),
            sink,
            notice,
            stats,
            version: crate::VERSION.to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Aggregator> {
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fold one editor event into the live records.
    pub fn handle_event(&self, event: &EditorEvent) -> EventOutcome {
        let outcome = self.lock().handle_event(event);
        match outcome {
            EventOutcome::Ignored => self.stats.record_event_ignored(),
            _ => self.stats.record_event_counted(),
        }
        outcome
    }

    /// Run `f` against the live aggregator.
    pub fn with_aggregator<R>(&self, f: impl FnOnce(&Aggregator) -> R) -> R {
        f(&self.lock())
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    pub fn notice(&self) -> &FailureNotice {
        &self.notice
    }

    /// Drain every record and dispatch the active ones for delivery.
    ///
    /// Must be called from within a tokio runtime. Deliveries are spawned and
    /// not awaited; the handles are returned for callers that want to wait.
    pub fn flush(&self) -> Vec<JoinHandle<()>> {
        let drained = self.lock().drain();

        if drained.discarded > 0 {
            tracing::debug!("discarded {} empty record(s)", drained.discarded);
            self.stats.record_discarded(drained.discarded as u64);
        }

        drained
            .ready
            .into_iter()
            .map(|record| {
                let payload = record.to_payload(&self.version);
                let sink = Arc::clone(&self.sink);
                let notice = Arc::clone(&self.notice);
                let stats = Arc::clone(&self.stats);

                tokio::spawn(async move {
                    let project = payload.project_key().to_string();
                    match sink.deliver(payload).await {
                        Ok(()) => {
                            stats.record_delivered();
                            tracing::info!("delivered keystroke data for {}", project);
                        }
                        Err(e) => {
                            stats.record_failed();
                            notice.report(&e);
                        }
                    }
                })
            })
            .collect()
    }
}

/// Handle to the repeating flush timer.
///
/// Dropping the handle aborts the timer; [`FlushScheduler::shutdown`] stops it
/// gracefully. Deliveries already dispatched are left to finish either way.
pub struct FlushScheduler {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    /// Start flushing `service` every `period` on the current runtime.
    pub fn start<S: DeliverySink>(service: Arc<KeystrokeService<S>>, period: Duration) -> Self {
        Self::start_on(&tokio::runtime::Handle::current(), service, period)
    }

    /// Start flushing `service` every `period` on `handle`.
    pub fn start_on<S: DeliverySink>(
        handle: &tokio::runtime::Handle,
        service: Arc<KeystrokeService<S>>,
        period: Duration,
    ) -> Self {
        let clamped = period.clamp(MIN_PERIOD, MAX_PERIOD);
        if clamped != period {
            tracing::warn!("flush period {:?} out of range, using {:?}", period, clamped);
        }
        let period = clamped;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = handle.spawn(async move {
            // First tick one full period from now, not immediately.
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::info!("flush scheduler stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let dispatched = service.flush();
                        if !dispatched.is_empty() {
                            tracing::debug!("dispatched {} record(s)", dispatched.len());
                        }
                    }
                }
            }
        });

        tracing::info!("flush scheduler started ({}s interval)", period.as_secs());

        Self {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the timer and wait for the timer task to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
