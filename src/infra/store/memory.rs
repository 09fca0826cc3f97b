//! In-memory store backends for development and testing.
//!
//! Claim operations take the store mutex for the whole find-and-update, which
//! gives them the same atomicity the Postgres adapter gets from conditional
//! `UPDATE ... RETURNING` — within a single process. Cross-process deployments
//! must use a durable backend.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::error::EngineError;
use crate::core::health::{
    AccountStatus, AccountStore, EgressPath, EgressStore, WorkerAccount,
};
use crate::util::ids::{AccountId, PathId};

/// In-memory account store.
#[derive(Default)]
pub struct InMemoryAccountStore {
    records: Mutex<HashMap<AccountId, WorkerAccount>>,
}

impl InMemoryAccountStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn insert(&self, account: WorkerAccount) -> Result<(), EngineError> {
        self.records.lock().insert(account.id, account);
        Ok(())
    }

    async fn get(&self, id: AccountId) -> Result<Option<WorkerAccount>, EngineError> {
        Ok(self.records.lock().get(&id).cloned())
    }

    async fn claim_live(
        &self,
        category: &str,
        exclude: &HashSet<AccountId>,
        now: u128,
    ) -> Result<Option<WorkerAccount>, EngineError> {
        let mut records = self.records.lock();
        let candidate = records
            .values()
            .filter(|account| {
                account.status == AccountStatus::Live
                    && account.category == category
                    && !exclude.contains(&account.id)
            })
            .min_by_key(|account| account.last_used_ms)
            .map(|account| account.id);
        let Some(id) = candidate else {
            return Ok(None);
        };
        let account = records
            .get_mut(&id)
            .ok_or_else(|| EngineError::Backend(format!("lost account {id} during claim")))?;
        if !account.begin_job(now) {
            return Ok(None);
        }
        Ok(Some(account.clone()))
    }

    async fn claim_for_check(&self, category: &str) -> Result<Option<WorkerAccount>, EngineError> {
        let mut records = self.records.lock();
        let candidate = records
            .values()
            .filter(|account| {
                account.category == category
                    && matches!(
                        account.status,
                        AccountStatus::Unchecked | AccountStatus::Die | AccountStatus::Live
                    )
            })
            .min_by_key(|account| account.last_used_ms)
            .map(|account| account.id);
        let Some(id) = candidate else {
            return Ok(None);
        };
        let account = records
            .get_mut(&id)
            .ok_or_else(|| EngineError::Backend(format!("lost account {id} during claim")))?;
        if !account.begin_check() {
            return Ok(None);
        }
        Ok(Some(account.clone()))
    }

    async fn update(&self, account: &WorkerAccount) -> Result<(), EngineError> {
        let mut records = self.records.lock();
        match records.get_mut(&account.id) {
            Some(stored) => {
                *stored = account.clone();
                Ok(())
            }
            None => Err(EngineError::Backend(format!(
                "update of unknown account {}",
                account.id
            ))),
        }
    }
}

/// In-memory egress path store.
#[derive(Default)]
pub struct InMemoryEgressStore {
    records: Mutex<HashMap<PathId, EgressPath>>,
}

impl InMemoryEgressStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EgressStore for InMemoryEgressStore {
    async fn insert(&self, path: EgressPath) -> Result<(), EngineError> {
        self.records.lock().insert(path.id, path);
        Ok(())
    }

    async fn get(&self, id: PathId) -> Result<Option<EgressPath>, EngineError> {
        Ok(self.records.lock().get(&id).cloned())
    }

    async fn candidates(&self) -> Result<Vec<EgressPath>, EngineError> {
        let records = self.records.lock();
        let mut paths: Vec<_> = records
            .values()
            .filter(|path| path.is_claimable())
            .cloned()
            .collect();
        paths.sort_by(|a, b| b.last_checked_ms.cmp(&a.last_checked_ms));
        Ok(paths)
    }

    async fn claim_next(&self) -> Result<Option<EgressPath>, EngineError> {
        let mut records = self.records.lock();
        let candidate = records
            .values()
            .filter(|path| path.is_claimable())
            .max_by_key(|path| path.last_checked_ms)
            .map(|path| path.id);
        let Some(id) = candidate else {
            return Ok(None);
        };
        let path = records
            .get_mut(&id)
            .ok_or_else(|| EngineError::Backend(format!("lost path {id} during claim")))?;
        if !path.begin_validation() {
            return Ok(None);
        }
        Ok(Some(path.clone()))
    }

    async fn begin_validation(&self, id: PathId) -> Result<Option<EgressPath>, EngineError> {
        let mut records = self.records.lock();
        Ok(records.get_mut(&id).and_then(|path| {
            if path.begin_validation() {
                Some(path.clone())
            } else {
                None
            }
        }))
    }

    async fn finish_validation(&self, id: PathId, ok: bool) -> Result<(), EngineError> {
        let mut records = self.records.lock();
        match records.get_mut(&id) {
            Some(path) => {
                path.finish_validation(ok);
                Ok(())
            }
            None => Err(EngineError::Backend(format!("unknown path {id}"))),
        }
    }

    async fn release(&self, id: PathId) -> Result<(), EngineError> {
        let mut records = self.records.lock();
        match records.get_mut(&id) {
            Some(path) => {
                path.release();
                Ok(())
            }
            None => Err(EngineError::Backend(format!("unknown path {id}"))),
        }
    }
}
