//! Health state machines for worker accounts and network egress paths.
//!
//! Both record types are created out-of-band (bulk import) and mutated only
//! through the transitions here and the claim/release operations on the store
//! traits. Pure transition logic lives on the record types so it can be unit
//! tested without a backend; [`HealthService`] applies transitions through the
//! persistence boundary and is the single place that enforces the
//! release-on-every-exit invariant for held egress paths.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::HealthConfig;
use crate::core::error::EngineError;
use crate::core::notify::{build_notice, SharedNotifier};
use crate::util::clock::now_ms;
use crate::util::ids::{AccountId, PathId};

/// Lifecycle status of a network egress path.
///
/// `Dead` is terminal: a path only ever enters it after a failed direct probe,
/// never speculatively, and never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    /// Imported but never probed.
    Unvalidated,
    /// Probed successfully and free to be claimed.
    Available,
    /// Claimed — either under an active probe or held by an account.
    Validating,
    /// Failed a direct probe. Terminal; excluded from every candidate scan.
    Dead,
}

/// Lifecycle status of a worker account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Imported but never health-checked.
    Unchecked,
    /// Passed its last health check and eligible for work.
    Live,
    /// Failed its last health check or was rejected by the remote.
    Die,
    /// Claimed by a health-check driver.
    Checking,
    /// Claimed for a job.
    InUse,
    /// Temporarily parked after crossing the error threshold.
    Resting,
    /// Terminal removed state, entered when the die streak reaches its limit.
    Error,
}

/// A validated outbound network route used when constructing heavyweight
/// resources and when accounts authenticate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgressPath {
    /// Record identity.
    pub id: PathId,
    /// Connection descriptor, e.g. `host:port` with scheme/credentials.
    pub descriptor: String,
    /// Current lifecycle status.
    pub status: PathStatus,
    /// Milliseconds-since-epoch of the last successful probe.
    pub last_checked_ms: u128,
}

impl EgressPath {
    /// Create an unvalidated path from a connection descriptor.
    #[must_use]
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self {
            id: PathId::new(),
            descriptor: descriptor.into(),
            status: PathStatus::Unvalidated,
            last_checked_ms: 0,
        }
    }

    /// Whether the path may be claimed for validation or use.
    #[must_use]
    pub const fn is_claimable(&self) -> bool {
        matches!(self.status, PathStatus::Unvalidated | PathStatus::Available)
    }

    /// Claim the path. Returns `false` when it is not claimable.
    pub fn begin_validation(&mut self) -> bool {
        if self.is_claimable() {
            self.status = PathStatus::Validating;
            true
        } else {
            false
        }
    }

    /// Record a direct probe result.
    pub fn finish_validation(&mut self, ok: bool) {
        if ok {
            self.status = PathStatus::Available;
            self.last_checked_ms = now_ms();
        } else {
            self.status = PathStatus::Dead;
        }
    }

    /// Return a held path to the candidate pool. Dead paths stay dead.
    pub fn release(&mut self) {
        if self.status != PathStatus::Dead {
            self.status = PathStatus::Available;
        }
    }
}

/// A health-checked worker account.
///
/// Invariants: an account holds at most one egress path; a die streak at or
/// above the configured limit forces [`AccountStatus::Error`] and the held
/// path is unconditionally released.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAccount {
    /// Record identity.
    pub id: AccountId,
    /// Login name at the remote service.
    pub username: String,
    /// Category tag scoping which jobs may claim this account.
    pub category: String,
    /// Current lifecycle status.
    pub status: AccountStatus,
    /// Consecutive failed health checks.
    pub die_streak: u32,
    /// Egress path currently held by this account, if any.
    pub egress_path: Option<PathId>,
    /// Completed jobs.
    pub success_count: u64,
    /// Consecutive failed jobs since the last success or rest.
    pub error_count: u32,
    /// Milliseconds-since-epoch of the last work claim.
    pub last_used_ms: u128,
}

impl WorkerAccount {
    /// Create an unchecked account in the given category.
    #[must_use]
    pub fn new(username: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(),
            username: username.into(),
            category: category.into(),
            status: AccountStatus::Unchecked,
            die_streak: 0,
            egress_path: None,
            success_count: 0,
            error_count: 0,
            last_used_ms: 0,
        }
    }

    /// Whether the account has been removed from rotation for good.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        matches!(self.status, AccountStatus::Error)
    }

    /// Claim the account for a health check. Returns `false` unless the
    /// current status is one of `Unchecked`, `Die`, or `Live`.
    pub fn begin_check(&mut self) -> bool {
        if matches!(
            self.status,
            AccountStatus::Unchecked | AccountStatus::Die | AccountStatus::Live
        ) {
            self.status = AccountStatus::Checking;
            true
        } else {
            false
        }
    }

    /// Claim the account for a job. Returns `false` unless it is `Live`.
    pub fn begin_job(&mut self, now: u128) -> bool {
        if self.status == AccountStatus::Live {
            self.status = AccountStatus::InUse;
            self.last_used_ms = now;
            true
        } else {
            false
        }
    }

    /// Apply a health-check (login) result.
    ///
    /// Success resets the die streak; failure bumps it and forces the terminal
    /// removed state once `die_streak_limit` is reached. The caller must
    /// release any held path via [`Self::take_path`] regardless of outcome.
    pub fn record_check(&mut self, ok: bool, die_streak_limit: u32) -> AccountStatus {
        if ok {
            self.die_streak = 0;
            self.status = AccountStatus::Live;
        } else {
            self.die_streak += 1;
            self.status = if self.die_streak >= die_streak_limit {
                AccountStatus::Error
            } else {
                AccountStatus::Die
            };
        }
        self.status
    }

    /// Apply a job outcome.
    ///
    /// Success returns the account to `Live` with the error counter reset. A
    /// soft failure keeps it `Live` until the error counter crosses the rest
    /// threshold, which parks it `Resting` with a fresh counter. A hard
    /// authentication failure maps to `Die` and counts toward the die streak.
    pub fn record_job(
        &mut self,
        outcome: JobOutcome,
        rest_error_threshold: u32,
        die_streak_limit: u32,
    ) -> AccountStatus {
        match outcome {
            JobOutcome::Success => {
                self.success_count += 1;
                self.error_count = 0;
                self.status = AccountStatus::Live;
            }
            JobOutcome::Failed => {
                self.error_count += 1;
                if self.error_count >= rest_error_threshold {
                    self.error_count = 0;
                    self.status = AccountStatus::Resting;
                } else {
                    self.status = AccountStatus::Live;
                }
            }
            JobOutcome::AuthRejected => {
                self.error_count += 1;
                self.die_streak += 1;
                self.status = if self.die_streak >= die_streak_limit {
                    AccountStatus::Error
                } else {
                    AccountStatus::Die
                };
            }
        }
        self.status
    }

    /// Detach and return the held egress path, if any.
    pub fn take_path(&mut self) -> Option<PathId> {
        self.egress_path.take()
    }
}

/// Result classification for a finished job, as reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The payload completed.
    Success,
    /// The payload failed for a reason other than authentication.
    Failed,
    /// The remote rejected the account's credentials.
    AuthRejected,
}

/// Durable storage boundary for worker accounts.
///
/// Claim operations MUST be atomic conditional updates (compare-and-swap on
/// status). That atomicity is the only concurrency guard that is safe across
/// multiple engine instances in separate processes.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Import an account record.
    async fn insert(&self, account: WorkerAccount) -> Result<(), EngineError>;

    /// Fetch an account by id.
    async fn get(&self, id: AccountId) -> Result<Option<WorkerAccount>, EngineError>;

    /// Atomically claim one `Live` account for work: category-scoped,
    /// excluding `exclude`, oldest `last_used_ms` first. The claimed record is
    /// returned already transitioned to `InUse` with its last-used timestamp
    /// set to `now`. `None` means nothing matched — an immediate hard miss,
    /// never a blocking wait.
    async fn claim_live(
        &self,
        category: &str,
        exclude: &HashSet<AccountId>,
        now: u128,
    ) -> Result<Option<WorkerAccount>, EngineError>;

    /// Atomically claim one account for a health check (`Unchecked`, `Die`, or
    /// `Live` → `Checking`), oldest last-used first.
    async fn claim_for_check(&self, category: &str) -> Result<Option<WorkerAccount>, EngineError>;

    /// Persist a record whose transitions were applied by the health machinery.
    async fn update(&self, account: &WorkerAccount) -> Result<(), EngineError>;
}

/// Durable storage boundary for egress paths.
#[async_trait]
pub trait EgressStore: Send + Sync + 'static {
    /// Import a path record.
    async fn insert(&self, path: EgressPath) -> Result<(), EngineError>;

    /// Fetch a path by id.
    async fn get(&self, id: PathId) -> Result<Option<EgressPath>, EngineError>;

    /// Claimable paths ordered most-recently-validated first.
    async fn candidates(&self) -> Result<Vec<EgressPath>, EngineError>;

    /// Atomically claim the best claimable path into `Validating`, most
    /// recently validated first. `None` when no path is claimable.
    async fn claim_next(&self) -> Result<Option<EgressPath>, EngineError>;

    /// Atomically claim a specific path into `Validating` if still claimable.
    async fn begin_validation(&self, id: PathId) -> Result<Option<EgressPath>, EngineError>;

    /// Record a direct probe result: success refreshes the last-checked
    /// timestamp and returns the path to `Available`; failure is terminal.
    async fn finish_validation(&self, id: PathId, ok: bool) -> Result<(), EngineError>;

    /// Return a held path to `Available`. Dead paths are never resurrected.
    async fn release(&self, id: PathId) -> Result<(), EngineError>;
}

/// Applies account transitions through the persistence boundary.
///
/// Every transition that ends an account's active association with a job or
/// health check releases its held egress path back to `Available` — this is
/// enforced here, unconditionally, before the outcome is even inspected.
pub struct HealthService {
    accounts: Arc<dyn AccountStore>,
    paths: Arc<dyn EgressStore>,
    cfg: HealthConfig,
    notifier: Option<SharedNotifier>,
}

impl HealthService {
    /// Create a service over the given stores.
    pub fn new(accounts: Arc<dyn AccountStore>, paths: Arc<dyn EgressStore>, cfg: HealthConfig) -> Self {
        Self {
            accounts,
            paths,
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

    /// Claim an egress path and attach it to the account. Returns the path id,
    /// or `None` when no path is claimable.
    pub async fn attach_path(&self, account_id: AccountId) -> Result<Option<PathId>, EngineError> {
        let Some(path) = self.paths.claim_next().await? else {
            debug!(account = %account_id, "no claimable egress path");
            return Ok(None);
        };
        let mut account = self.load(account_id).await?;
        if let Some(previous) = account.take_path() {
            // A stale hold would break the one-path-per-account invariant.
            warn!(account = %account_id, path = %previous, "releasing stale path hold");
            self.paths.release(previous).await?;
        }
        account.egress_path = Some(path.id);
        self.accounts.update(&account).await?;
        Ok(Some(path.id))
    }

    /// Atomically claim an account for a health check.
    pub async fn claim_for_check(&self, category: &str) -> Result<Option<WorkerAccount>, EngineError> {
        self.accounts.claim_for_check(category).await
    }

    /// Record a health-check (login) result and persist the transition.
    pub async fn record_check(&self, account_id: AccountId, ok: bool) -> Result<AccountStatus, EngineError> {
        let mut account = self.load(account_id).await?;
        self.release_held_path(&mut account).await?;
        let status = account.record_check(ok, self.cfg.die_streak_limit);
        self.accounts.update(&account).await?;
        self.after_transition(&account, "check");
        Ok(status)
    }

    /// Record a job outcome and persist the transition.
    pub async fn record_job(&self, account_id: AccountId, outcome: JobOutcome) -> Result<AccountStatus, EngineError> {
        let mut account = self.load(account_id).await?;
        self.release_held_path(&mut account).await?;
        let status = account.record_job(
            outcome,
            self.cfg.rest_error_threshold,
            self.cfg.die_streak_limit,
        );
        self.accounts.update(&account).await?;
        self.after_transition(&account, "job");
        Ok(status)
    }

    async fn load(&self, account_id: AccountId) -> Result<WorkerAccount, EngineError> {
        self.accounts
            .get(account_id)
            .await?
            .ok_or_else(|| EngineError::Backend(format!("unknown account {account_id}")))
    }

    async fn release_held_path(&self, account: &mut WorkerAccount) -> Result<(), EngineError> {
        if let Some(path_id) = account.take_path() {
            self.paths.release(path_id).await?;
        }
        Ok(())
    }

    fn after_transition(&self, account: &WorkerAccount, origin: &str) {
        if account.is_removed() {
            info!(
                account = %account.id,
                username = %account.username,
                die_streak = account.die_streak,
                "account removed from rotation"
            );
            self.notify(
                "account:removed",
                serde_json::json!({
                    "account": account.id,
                    "username": account.username,
                    "die_streak": account.die_streak,
                }),
            );
        } else {
            self.notify(
                "account:status",
                serde_json::json!({
                    "account": account.id,
                    "status": account.status,
                    "origin": origin,
                }),
            );
        }
    }

    fn notify(&self, name: &str, payload: serde_json::Value) {
        if let Some(notifier) = &self.notifier {
            notifier.lock().notify(build_notice(name, payload));
        }
    }
}
