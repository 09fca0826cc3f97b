//! Error types for engine operations.

use std::time::Duration;

use thiserror::Error;

use crate::core::health::WorkerAccount;
use crate::util::ids::ResourceId;

/// Errors produced by engine components.
///
/// Task-level errors never abort the runner process; they are recorded and
/// surfaced via lifecycle events. Construction errors leave the affected pool
/// slot empty until the next scheduled respawn attempt.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A task attempt failed in a way that is retryable within the configured
    /// retry budget.
    #[error("transient task failure: {0}")]
    Transient(String),
    /// A task attempt exceeded its timeout. Treated as transient unless the
    /// retry budget is exhausted.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),
    /// The cumulative terminal-error counter reached the configured limit and
    /// the run was aborted early. Partial results are retained.
    #[error("error limit reached after {failed} terminal task failures")]
    FatalRunner {
        /// Terminal failures accumulated when the breaker tripped.
        failed: u32,
    },
    /// A heavyweight resource could not be constructed, e.g. no viable egress
    /// path survived probing.
    #[error("resource construction failed: {0}")]
    ResourceCreation(String),
    /// A heavyweight resource reported a disconnection signal.
    #[error("resource {0} crashed")]
    ResourceCrash(ResourceId),
    /// No eligible account or leaf was available to claim. Backing off and
    /// retrying is the caller's decision, not the pool's.
    #[error("no eligible resource available to claim")]
    AcquisitionExhausted,
    /// The remote endpoint rejected the account's credentials. Payloads raise
    /// this to mark a hard authentication failure, which maps the account to
    /// `Die` rather than a soft job failure.
    #[error("authentication rejected")]
    AuthRejected,
    /// The pool has been shut down; parked acquisitions are failed fast.
    #[error("pool is shut down")]
    PoolClosed,
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// A job exhausted every account attempt. Carries the last account used so
    /// the caller can do its own bookkeeping.
    #[error(transparent)]
    Terminal(#[from] TerminalFailure),
}

/// Terminal outcome of an orchestrated job: every account attempt failed.
///
/// The last account tried (if any was ever claimed) rides along so the job
/// initiator can record blame without the engine knowing what that bookkeeping
/// means.
#[derive(Debug, Error)]
#[error("job exhausted all account attempts")]
pub struct TerminalFailure {
    /// The most recently claimed account, if any attempt got that far.
    pub last_account: Option<WorkerAccount>,
}

impl EngineError {
    /// Whether this error represents a hard authentication failure.
    #[must_use]
    pub const fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::AuthRejected)
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
