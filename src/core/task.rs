//! Task capability trait and queued-task bookkeeping.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::EngineError;
use crate::util::ids::TaskId;

/// Context handed to every task attempt.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Runner-assigned task identity.
    pub task_id: TaskId,
    /// 1-based attempt number for this execution.
    pub attempt: u32,
}

/// The one capability the engine requires of a unit of work.
///
/// Domain payloads ("authenticate and perform protocol work", "probe
/// connectivity") implement this trait; the runner depends on nothing else.
/// Any error is treated as transient until the retry budget is exhausted.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_fleet::core::{EngineError, TaskContext, TaskOp};
///
/// struct FetchListing {
///     item: String,
/// }
///
/// #[async_trait]
/// impl TaskOp for FetchListing {
///     async fn execute(&self, ctx: &TaskContext) -> Result<(), EngineError> {
///         tracing::info!(task = ctx.task_id, item = %self.item, "fetching");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskOp: Send + Sync + 'static {
    /// Run one attempt of the operation.
    async fn execute(&self, ctx: &TaskContext) -> Result<(), EngineError>;
}

/// One unit of queued work: identity, the opaque operation, and an attempt
/// counter. Created per unit of work and discarded after a terminal outcome.
pub struct QueuedTask {
    /// Runner-assigned identity.
    pub id: TaskId,
    /// Attempts consumed so far.
    pub attempts: u32,
    /// The opaque operation. Shared so retries re-dispatch the same payload.
    pub op: Arc<dyn TaskOp>,
}

impl QueuedTask {
    /// Wrap an operation with a fresh attempt counter.
    pub fn new(id: TaskId, op: Arc<dyn TaskOp>) -> Self {
        Self { id, attempts: 0, op }
    }
}
