//! Engine configuration structures.
//!
//! Every section is a serde model with builder-style `with_*` methods, a
//! `validate()` gate, and workable defaults. [`EngineConfig::from_env`] layers
//! environment overrides (via `dotenvy`) over the defaults for binaries that
//! configure themselves from the process environment.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;

/// Task runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Soft cap on simultaneously in-flight tasks.
    pub concurrency: usize,
    /// Spacing between dispatches; also the fixed delay before a retry.
    pub task_delay: Duration,
    /// Total attempts allowed per task (first attempt included).
    pub retries: u32,
    /// Per-attempt timeout.
    pub task_timeout: Duration,
    /// Cumulative terminal-failure limit before the run aborts early.
    pub max_errors: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get().clamp(1, 8),
            task_delay: Duration::from_millis(250),
            retries: 3,
            task_timeout: Duration::from_secs(30),
            max_errors: 10,
        }
    }
}

impl RunnerConfig {
    /// Defaults sized from the host CPU count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency cap.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the dispatch/retry delay.
    #[must_use]
    pub const fn with_task_delay(mut self, delay: Duration) -> Self {
        self.task_delay = delay;
        self
    }

    /// Set the per-task attempt budget.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub const fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Set the cumulative error limit.
    #[must_use]
    pub const fn with_max_errors(mut self, max_errors: u32) -> Self {
        self.max_errors = max_errors;
        self
    }

    /// Validate invariants.
    ///
    /// # Errors
    ///
    /// A description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("concurrency must be at least 1".into());
        }
        if self.retries == 0 {
            return Err("retries must allow at least one attempt".into());
        }
        if self.max_errors == 0 {
            return Err("max_errors must be at least 1".into());
        }
        if self.task_timeout.is_zero() {
            return Err("task_timeout must be non-zero".into());
        }
        Ok(())
    }
}

/// Resource pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Target number of heavyweight resources kept online.
    pub size: usize,
    /// Leaves each resource is expected to bring (factories are checked
    /// against this at construction).
    pub leaves_per_resource: usize,
    /// Cooldown between a crash signal and the respawn attempt.
    pub respawn_cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 2,
            leaves_per_resource: 4,
            respawn_cooldown: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    /// Defaults for a small local fleet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target resource count.
    #[must_use]
    pub const fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the expected leaf count per resource.
    #[must_use]
    pub const fn with_leaves_per_resource(mut self, leaves: usize) -> Self {
        self.leaves_per_resource = leaves;
        self
    }

    /// Set the respawn cooldown.
    #[must_use]
    pub const fn with_respawn_cooldown(mut self, cooldown: Duration) -> Self {
        self.respawn_cooldown = cooldown;
        self
    }

    /// Validate invariants.
    ///
    /// # Errors
    ///
    /// A description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.size == 0 {
            return Err("pool size must be at least 1".into());
        }
        if self.leaves_per_resource == 0 {
            return Err("leaves_per_resource must be at least 1".into());
        }
        Ok(())
    }
}

/// Health policy thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Consecutive failed health checks before an account is removed for good.
    pub die_streak_limit: u32,
    /// Consecutive job failures before an account is parked `Resting`.
    pub rest_error_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            die_streak_limit: 5,
            rest_error_threshold: 3,
        }
    }
}

impl HealthConfig {
    /// Default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the die-streak removal limit.
    #[must_use]
    pub const fn with_die_streak_limit(mut self, limit: u32) -> Self {
        self.die_streak_limit = limit;
        self
    }

    /// Set the resting threshold.
    #[must_use]
    pub const fn with_rest_error_threshold(mut self, threshold: u32) -> Self {
        self.rest_error_threshold = threshold;
        self
    }

    /// Validate invariants.
    ///
    /// # Errors
    ///
    /// A description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.die_streak_limit == 0 {
            return Err("die_streak_limit must be at least 1".into());
        }
        if self.rest_error_threshold == 0 {
            return Err("rest_error_threshold must be at least 1".into());
        }
        Ok(())
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Account attempts (including acquisition misses) before a job fails
    /// terminally.
    pub max_account_attempts: u32,
    /// Sleep after an acquisition miss before the next attempt.
    pub acquire_retry_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_account_attempts: 3,
            acquire_retry_delay: Duration::from_secs(5),
        }
    }
}

impl OrchestratorConfig {
    /// Default attempt budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the attempt limit.
    #[must_use]
    pub const fn with_max_account_attempts(mut self, attempts: u32) -> Self {
        self.max_account_attempts = attempts;
        self
    }

    /// Set the acquisition-miss backoff.
    #[must_use]
    pub const fn with_acquire_retry_delay(mut self, delay: Duration) -> Self {
        self.acquire_retry_delay = delay;
        self
    }

    /// Validate invariants.
    ///
    /// # Errors
    ///
    /// A description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_account_attempts == 0 {
            return Err("max_account_attempts must be at least 1".into());
        }
        Ok(())
    }
}

/// Root engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Task runner section.
    pub runner: RunnerConfig,
    /// Resource pool section.
    pub pool: PoolConfig,
    /// Health policy section.
    pub health: HealthConfig,
    /// Orchestrator section.
    pub orchestrator: OrchestratorConfig,
}

impl EngineConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// The first violated constraint, prefixed with its section.
    pub fn validate(&self) -> Result<(), String> {
        self.runner.validate().map_err(|e| format!("runner: {e}"))?;
        self.pool.validate().map_err(|e| format!("pool: {e}"))?;
        self.health.validate().map_err(|e| format!("health: {e}"))?;
        self.orchestrator
            .validate()
            .map_err(|e| format!("orchestrator: {e}"))?;
        Ok(())
    }

    /// Build a configuration from the process environment, layered over the
    /// defaults. A `.env` file is honored when present. Recognized variables
    /// use the `FLEET_` prefix, e.g. `FLEET_CONCURRENCY`,
    /// `FLEET_TASK_DELAY_MS`, `FLEET_POOL_SIZE`, `FLEET_DIE_STREAK_LIMIT`.
    ///
    /// # Errors
    ///
    /// A variable that is present but unparseable, or a section that fails
    /// validation.
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<usize>("FLEET_CONCURRENCY")? {
            cfg.runner.concurrency = v;
        }
        if let Some(v) = env_parse::<u64>("FLEET_TASK_DELAY_MS")? {
            cfg.runner.task_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u32>("FLEET_RETRIES")? {
            cfg.runner.retries = v;
        }
        if let Some(v) = env_parse::<u64>("FLEET_TASK_TIMEOUT_MS")? {
            cfg.runner.task_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u32>("FLEET_MAX_ERRORS")? {
            cfg.runner.max_errors = v;
        }
        if let Some(v) = env_parse::<usize>("FLEET_POOL_SIZE")? {
            cfg.pool.size = v;
        }
        if let Some(v) = env_parse::<usize>("FLEET_LEAVES_PER_RESOURCE")? {
            cfg.pool.leaves_per_resource = v;
        }
        if let Some(v) = env_parse::<u64>("FLEET_RESPAWN_COOLDOWN_MS")? {
            cfg.pool.respawn_cooldown = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u32>("FLEET_DIE_STREAK_LIMIT")? {
            cfg.health.die_streak_limit = v;
        }
        if let Some(v) = env_parse::<u32>("FLEET_REST_ERROR_THRESHOLD")? {
            cfg.health.rest_error_threshold = v;
        }
        if let Some(v) = env_parse::<u32>("FLEET_JOB_ATTEMPTS")? {
            cfg.orchestrator.max_account_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("FLEET_ACQUIRE_RETRY_MS")? {
            cfg.orchestrator.acquire_retry_delay = Duration::from_millis(v);
        }

        cfg.validate()
            .map_err(|e| anyhow::anyhow!("invalid engine config: {e}"))?;
        Ok(cfg)
    }
}

fn env_parse<T: FromStr>(key: &str) -> AppResult<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => {
            let parsed = raw
                .parse::<T>()
                .with_context(|| format!("parsing {key}={raw}"))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}
