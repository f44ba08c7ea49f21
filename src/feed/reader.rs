//! JSON-lines event reader.
//!
//! Editors that spawn the agent as a child process write one event per line
//! to its stdin. The reader runs on its own thread and forwards every parsed
//! event into the feed channel; bad lines are logged and skipped.

use crate::feed::types::EditorEvent;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Capacity of the event channel.
pub const FEED_CAPACITY: usize = 10_000;

/// Errors that can occur while reading the event feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Feed reader is already running")]
    AlreadyRunning,
    #[error("Invalid event on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse one feed line. Blank lines yield `None`.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<EditorEvent>, FeedError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| FeedError::Parse {
            line: line_no,
            source,
        })
}

/// Channel the stdin reader pushes parsed events into.
pub struct EventFeed {
    sender: Sender<EditorEvent>,
    receiver: Receiver<EditorEvent>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl EventFeed {
    /// Create a new feed with a bounded channel.
    pub fn new() -> Self {
        // Bounded so a runaway producer cannot grow memory without limit
        let (sender, receiver) = bounded(FEED_CAPACITY);
        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Get the receiver for editor events.
    pub fn receiver(&self) -> &Receiver<EditorEvent> {
        &self.receiver
    }

    /// Start reading JSON lines from `input` on a background thread.
    pub fn start_reader<R>(&mut self, input: R) -> Result<(), FeedError>
    where
        R: BufRead + Send + 'static,
    {
        if self.running.load(Ordering::SeqCst) {
            return Err(FeedError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        let sender = self.sender.clone();
        let running = self.running.clone();

        let handle = thread::spawn(move || {
            read_lines(input, &sender, &running);
            running.store(false, Ordering::SeqCst);
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Start reading events from the process's stdin.
    pub fn start_stdin(&mut self) -> Result<(), FeedError> {
        self.start_reader(std::io::BufReader::new(std::io::stdin()))
    }

    /// Whether the reader thread is still consuming input.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop accepting lines from the reader.
    ///
    /// A thread blocked on stdin only notices once the next line arrives, so
    /// this does not join it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.thread_handle.take();
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

fn read_lines<R: BufRead>(input: R, sender: &Sender<EditorEvent>, running: &AtomicBool) {
    for (idx, line) in input.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("event feed read error: {}", e);
                break;
            }
        };
        match parse_line(idx + 1, &line) {
            Ok(Some(event)) => {
                if sender.send(event).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("{}", e),
        }
    }
    tracing::debug!("event feed reader finished");
}
