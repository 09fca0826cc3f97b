//! Notification sink implementations.
//!
//! The engine emits fire-and-forget notices (status changed, resource removed,
//! run ended) toward an external observer. No delivery or ordering guarantee
//! is required of the sink; implementations must never block the engine.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::util::clock::now_ms;

/// A single fire-and-forget notice.
#[derive(Debug, Clone)]
pub struct Notice {
    /// Event name, e.g. `run:ended` or `account:removed`.
    pub name: String,
    /// Structured event payload.
    pub payload: serde_json::Value,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

/// Notification sink abstraction.
pub trait Notifier: Send {
    /// Deliver a notice. Best effort; failures are the sink's problem.
    fn notify(&mut self, notice: Notice);
}

/// Shared handle shape used to attach a sink to engine services.
pub type SharedNotifier = Arc<Mutex<Box<dyn Notifier>>>;

/// Wrap a sink in the shared handle shape.
pub fn share_notifier(notifier: Box<dyn Notifier>) -> SharedNotifier {
    Arc::new(Mutex::new(notifier))
}

/// In-memory sink with a bounded buffer, for testing and dev.
pub struct InMemoryNotifier {
    notices: VecDeque<Notice>,
    max_notices: usize,
}

impl InMemoryNotifier {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_notices: usize) -> Self {
        Self {
            notices: VecDeque::with_capacity(max_notices),
            max_notices,
        }
    }

    /// Retrieve a snapshot of stored notices.
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.iter().cloned().collect()
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&mut self, notice: Notice) {
        if self.notices.len() >= self.max_notices {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }
}

/// Sink that forwards notices to the tracing pipeline.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, notice: Notice) {
        tracing::info!(name = %notice.name, payload = %notice.payload, "notice");
    }
}

/// Helper to stamp a notice from a name and payload.
pub fn build_notice(name: impl Into<String>, payload: serde_json::Value) -> Notice {
    Notice {
        name: name.into(),
        payload,
        created_at_ms: now_ms(),
    }
}
