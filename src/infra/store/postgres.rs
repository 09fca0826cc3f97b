//! Postgres-backed store adapters (schema and interface stubs).
//!
//! The schema and claim statements below are what a wired deployment runs;
//! actual DB I/O requires a runtime + client and is left to the integration
//! layer. The claim statements are single conditional `UPDATE ... RETURNING`
//! rounds — the compare-and-swap on status that makes claiming safe across
//! multiple engine processes.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::core::error::EngineError;
use crate::core::health::{AccountStore, EgressPath, EgressStore, WorkerAccount};
use crate::util::ids::{AccountId, PathId};

/// Postgres account store adapter placeholder.
pub struct PostgresAccountStore;

impl PostgresAccountStore {
    /// Migration statements for the account table.
    #[must_use]
    pub fn migrations() -> &'static [&'static str] {
        &[
            r#"
CREATE TABLE IF NOT EXISTS fleet_accounts (
    id UUID PRIMARY KEY,
    username TEXT NOT NULL,
    category TEXT NOT NULL,
    status TEXT NOT NULL,
    die_streak INT NOT NULL DEFAULT 0,
    egress_path UUID,
    success_count BIGINT NOT NULL DEFAULT 0,
    error_count INT NOT NULL DEFAULT 0,
    last_used_at TIMESTAMPTZ NOT NULL DEFAULT 'epoch',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_fleet_accounts_claim ON fleet_accounts (category, status, last_used_at);
"#,
        ]
    }

    /// The atomic work-claim statement: conditional on `status = 'live'`,
    /// scoped by category, exclusion-aware, oldest last-used first.
    #[must_use]
    pub fn claim_live_sql() -> &'static str {
        r"
UPDATE fleet_accounts
SET status = 'in_use', last_used_at = NOW()
WHERE id = (
    SELECT id FROM fleet_accounts
    WHERE status = 'live' AND category = $1 AND NOT (id = ANY($2))
    ORDER BY last_used_at ASC
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
RETURNING *
"
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn insert(&self, _account: WorkerAccount) -> Result<(), EngineError> {
        Err(EngineError::Backend(
            "postgres store not wired to database client".into(),
        ))
    }

    async fn get(&self, _id: AccountId) -> Result<Option<WorkerAccount>, EngineError> {
        Err(EngineError::Backend(
            "postgres store not wired to database client".into(),
        ))
    }

    async fn claim_live(
        &self,
        _category: &str,
        _exclude: &HashSet<AccountId>,
        _now: u128,
    ) -> Result<Option<WorkerAccount>, EngineError> {
        Err(EngineError::Backend(
            "postgres store not wired to database client".into(),
        ))
    }

    async fn claim_for_check(&self, _category: &str) -> Result<Option<WorkerAccount>, EngineError> {
        Err(EngineError::Backend(
            "postgres store not wired to database client".into(),
        ))
    }

    async fn update(&self, _account: &WorkerAccount) -> Result<(), EngineError> {
        Err(EngineError::Backend(
            "postgres store not wired to database client".into(),
        ))
    }
}

/// Postgres egress path store adapter placeholder.
pub struct PostgresEgressStore;

impl PostgresEgressStore {
    /// Migration statements for the path table.
    #[must_use]
    pub fn migrations() -> &'static [&'static str] {
        &[
            r#"
CREATE TABLE IF NOT EXISTS fleet_egress_paths (
    id UUID PRIMARY KEY,
    descriptor TEXT NOT NULL,
    status TEXT NOT NULL,
    last_checked_at TIMESTAMPTZ NOT NULL DEFAULT 'epoch',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_fleet_egress_paths_claim ON fleet_egress_paths (status, last_checked_at DESC);
"#,
        ]
    }

    /// The atomic path-claim statement: most recently validated first.
    #[must_use]
    pub fn claim_next_sql() -> &'static str {
        r"
UPDATE fleet_egress_paths
SET status = 'validating'
WHERE id = (
    SELECT id FROM fleet_egress_paths
    WHERE status IN ('unvalidated', 'available')
    ORDER BY last_checked_at DESC
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
RETURNING *
"
    }
}

#[async_trait]
impl EgressStore for PostgresEgressStore {
    async fn insert(&self, _path: EgressPath) -> Result<(), EngineError> {
        Err(EngineError::Backend(
            "postgres store not wired to database client".into(),
        ))
    }

    async fn get(&self, _id: PathId) -> Result<Option<EgressPath>, EngineError> {
        Err(EngineError::Backend(
            "postgres store not wired to database client".into(),
        ))
    }

    async fn candidates(&self) -> Result<Vec<EgressPath>, EngineError> {
        Err(EngineError::Backend(
            "postgres store not wired to database client".into(),
        ))
    }

    async fn claim_next(&self) -> Result<Option<EgressPath>, EngineError> {
        Err(EngineError::Backend(
            "postgres store not wired to database client".into(),
        ))
    }

    async fn begin_validation(&self, _id: PathId) -> Result<Option<EgressPath>, EngineError> {
        Err(EngineError::Backend(
            "postgres store not wired to database client".into(),
        ))
    }

    async fn finish_validation(&self, _id: PathId, _ok: bool) -> Result<(), EngineError> {
        Err(EngineError::Backend(
            "postgres store not wired to database client".into(),
        ))
    }

    async fn release(&self, _id: PathId) -> Result<(), EngineError> {
        Err(EngineError::Backend(
            "postgres store not wired to database client".into(),
        ))
    }
}
