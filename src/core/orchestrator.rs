//! Job-level driver pairing one unit of work with an acquired account.
//!
//! Account acquisition follows the pool contract but with no in-memory queue:
//! the store's atomic conditional update claims one `Live` account
//! (category-scoped, exclusion-aware, oldest-last-used first), and a miss is
//! an immediate hard failure — the orchestrator, as the caller, decides to
//! sleep and try again, bounded by the attempt limit. Every account touched
//! along the way is released through the health machinery, which also returns
//! any held egress path.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::core::error::{EngineError, TerminalFailure};
use crate::core::health::{AccountStore, HealthService, JobOutcome, WorkerAccount};
use crate::core::notify::{build_notice, SharedNotifier};
use crate::util::clock::now_ms;

/// One unit of work bound to an account category.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Category tag scoping which accounts may serve this job.
    pub category: String,
    /// Human-readable label used in step logs and notices.
    pub label: String,
}

/// Structured per-step logging callback handed to job payloads.
///
/// Steps always land in the tracing pipeline; an optional sink receives them
/// as well, letting callers forward progress to their own observers.
pub struct StepLogger {
    job: String,
    sink: Option<Box<dyn Fn(&str, &serde_json::Value) + Send + Sync>>,
}

impl StepLogger {
    /// Create a logger for the given job label.
    #[must_use]
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            sink: None,
        }
    }

    /// Forward steps to an additional sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn Fn(&str, &serde_json::Value) + Send + Sync>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Record one step.
    pub fn step(&self, name: &str, detail: serde_json::Value) {
        info!(job = %self.job, step = name, detail = %detail, "job step");
        if let Some(sink) = &self.sink {
            sink(name, &detail);
        }
    }
}

/// The opaque job operation driven against one claimed account.
#[async_trait]
pub trait JobPayload: Send + Sync {
    /// Value produced on success.
    type Output: Send;

    /// Run the work with the claimed account. Raise
    /// [`EngineError::AuthRejected`] for hard authentication failures so the
    /// account is mapped to `Die` rather than a soft failure.
    async fn execute(
        &self,
        account: &WorkerAccount,
        log: &StepLogger,
    ) -> Result<Self::Output, EngineError>;
}

/// Drives one unit of work to completion with cross-account fallback.
pub struct Orchestrator {
    accounts: Arc<dyn AccountStore>,
    health: Arc<HealthService>,
    cfg: OrchestratorConfig,
    notifier: Option<SharedNotifier>,
}

impl Orchestrator {
    /// Create an orchestrator over the given account store and health
    /// machinery.
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        health: Arc<HealthService>,
        cfg: OrchestratorConfig,
    ) -> Self {
        Self {
            accounts,
            health,
            cfg,
            notifier: None,
        }
    }

    /// Attach a fire-and-forget notification sink.
    #[must_use]
    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Drive one job to completion or exhaustion.
    ///
    /// Loops up to the configured attempt limit. Each iteration claims one
    /// account not yet tried this job; a miss sleeps the acquire-retry
    /// interval and consumes an attempt. A payload success releases the
    /// account through the health machinery and returns the output. A payload
    /// failure records the outcome (hard authentication failures map the
    /// account to `Die`), excludes the account, and continues.
    ///
    /// # Errors
    ///
    /// [`EngineError::Terminal`] carrying the last account used once all
    /// attempts are exhausted; backend errors propagate as-is.
    pub async fn run<P: JobPayload>(
        &self,
        spec: &JobSpec,
        payload: &P,
    ) -> Result<P::Output, EngineError> {
        let mut excluded: HashSet<_> = HashSet::new();
        let mut last_account: Option<WorkerAccount> = None;
        let log = StepLogger::new(spec.label.clone());

        for attempt in 1..=self.cfg.max_account_attempts {
            let claimed = self
                .accounts
                .claim_live(&spec.category, &excluded, now_ms())
                .await?;
            let Some(account) = claimed else {
                debug!(
                    attempt,
                    category = %spec.category,
                    "no live account to claim; backing off"
                );
                log.step("acquire:miss", serde_json::json!({ "attempt": attempt }));
                tokio::time::sleep(self.cfg.acquire_retry_delay).await;
                continue;
            };

            log.step(
                "acquire",
                serde_json::json!({ "attempt": attempt, "account": account.id }),
            );
            last_account = Some(account.clone());

            match payload.execute(&account, &log).await {
                Ok(output) => {
                    self.health
                        .record_job(account.id, JobOutcome::Success)
                        .await?;
                    log.step("complete", serde_json::json!({ "account": account.id }));
                    self.notify_ended(spec, true);
                    return Ok(output);
                }
                Err(err) => {
                    let outcome = if err.is_auth_rejection() {
                        JobOutcome::AuthRejected
                    } else {
                        JobOutcome::Failed
                    };
                    warn!(
                        attempt,
                        account = %account.id,
                        error = %err,
                        "job attempt failed; excluding account"
                    );
                    self.health.record_job(account.id, outcome).await?;
                    excluded.insert(account.id);
                    log.step(
                        "attempt:failed",
                        serde_json::json!({ "account": account.id, "reason": err.to_string() }),
                    );
                }
            }
        }

        self.notify_ended(spec, false);
        Err(EngineError::Terminal(TerminalFailure { last_account }))
    }

    fn notify_ended(&self, spec: &JobSpec, ok: bool) {
        if let Some(notifier) = &self.notifier {
            notifier.lock().notify(build_notice(
                "job:ended",
                serde_json::json!({ "job": spec.label, "category": spec.category, "ok": ok }),
            ));
        }
    }
}
