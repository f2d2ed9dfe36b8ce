//! Progress events and cancellation
//!
//! Batch coordinators emit [`ProgressEvent`]s from the coordinating thread.
//! Consumers on another thread receive them through a bounded channel
//! ([`progress_channel`]); intermediate events are dropped rather than block
//! when the consumer falls behind, the terminal `Finished` event is always
//! delivered while the receiver is alive.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use indicatif::ProgressBar;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { total: usize },
    Advanced { done: usize, total: usize, name: String },
    Finished { total: usize },
}

/// Receives progress notifications. Must not block for long.
pub trait ProgressSink {
    fn emit(&self, event: ProgressEvent);
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sending half of a progress channel.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Sender<ProgressEvent>,
}

/// Bounded event channel between a batch operation and its observer.
pub fn progress_channel(capacity: usize) -> (ProgressSender, Receiver<ProgressEvent>) {
    let (tx, rx) = bounded(capacity.max(1));
    (ProgressSender { tx }, rx)
}

impl ProgressSink for ProgressSender {
    fn emit(&self, event: ProgressEvent) {
        if matches!(event, ProgressEvent::Finished { .. }) {
            // receiver gone is fine
            let _ = self.tx.send(event);
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => tracing::trace!("Progress event dropped, observer busy"),
        }
    }
}

impl ProgressSink for ProgressBar {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { total } => {
                self.set_length(total as u64);
                self.set_position(0);
            }
            ProgressEvent::Advanced { done, name, .. } => {
                self.set_position(done as u64);
                self.set_message(name);
            }
            ProgressEvent::Finished { total } => {
                self.set_position(total as u64);
                self.finish_and_clear();
            }
        }
    }
}

/// Keeps every event, for tests and post-hoc inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Folds events into one monotonically increasing percentage.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProgressTracker {
    total: usize,
    done: usize,
    percent: f64,
    finished: bool,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &ProgressEvent) -> f64 {
        match *event {
            ProgressEvent::Started { total } => {
                *self = Self {
                    total,
                    ..Self::default()
                };
            }
            ProgressEvent::Advanced { done, total, .. } => {
                self.total = total;
                self.done = self.done.max(done.min(total));
                let pct = if total == 0 {
                    100.0
                } else {
                    self.done as f64 / total as f64 * 100.0
                };
                self.percent = self.percent.max(pct);
            }
            ProgressEvent::Finished { total } => {
                self.total = total;
                self.done = total;
                self.percent = 100.0;
                self.finished = true;
            }
        }
        self.percent
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn done(&self) -> usize {
        self.done
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Cooperative cancellation shared between the caller and a running batch.
/// Items not yet started when the flag is raised are reported as skipped.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reason recorded for items skipped after cancellation.
pub const CANCELLED: &str = "cancelled";
