//! Builders to construct engine services from configuration.
//!
//! Services are explicitly constructed and dependency-injected — stores,
//! factories, and probes come in as arguments, never as ambient state. Every
//! builder validates the full configuration first.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::error::EngineError;
use crate::core::health::{AccountStore, EgressStore, HealthService};
use crate::core::notify::SharedNotifier;
use crate::core::orchestrator::Orchestrator;
use crate::core::pool::{ConnectivityProbe, ResourceFactory, ResourcePool};
use crate::core::runner::{Spawn, TaskRunner};

fn validated(cfg: &EngineConfig) -> Result<(), EngineError> {
    cfg.validate()
        .map_err(|e| EngineError::Backend(format!("config invalid: {e}")))
}

/// Build a task runner from configuration.
///
/// # Errors
///
/// `Backend` when the configuration fails validation.
pub fn build_runner<S>(
    cfg: &EngineConfig,
    spawner: S,
    notifier: Option<SharedNotifier>,
) -> Result<TaskRunner<S>, EngineError>
where
    S: Spawn + Send + Sync + 'static,
{
    validated(cfg)?;
    let mut runner = TaskRunner::new(cfg.runner.clone(), spawner);
    if let Some(notifier) = notifier {
        runner = runner.with_notifier(notifier);
    }
    Ok(runner)
}

/// Build a resource pool from configuration and injected collaborators. The
/// pool comes back offline; call `init()` to bring resources up.
///
/// # Errors
///
/// `Backend` when the configuration fails validation.
pub fn build_pool<F, S>(
    cfg: &EngineConfig,
    factory: F,
    probe: Arc<dyn ConnectivityProbe>,
    paths: Arc<dyn EgressStore>,
    spawner: S,
    notifier: Option<SharedNotifier>,
) -> Result<ResourcePool<F, S>, EngineError>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    validated(cfg)?;
    let mut pool = ResourcePool::new(cfg.pool.clone(), factory, probe, paths, spawner);
    if let Some(notifier) = notifier {
        pool = pool.with_notifier(notifier);
    }
    Ok(pool)
}

/// Build an orchestrator (with its health machinery) over the given stores.
///
/// # Errors
///
/// `Backend` when the configuration fails validation.
pub fn build_orchestrator(
    cfg: &EngineConfig,
    accounts: Arc<dyn AccountStore>,
    paths: Arc<dyn EgressStore>,
    notifier: Option<SharedNotifier>,
) -> Result<Orchestrator, EngineError> {
    validated(cfg)?;
    let mut health = HealthService::new(Arc::clone(&accounts), paths, cfg.health.clone());
    if let Some(notifier) = &notifier {
        health = health.with_notifier(Arc::clone(notifier));
    }
    let mut orchestrator = Orchestrator::new(accounts, Arc::new(health), cfg.orchestrator.clone());
    if let Some(notifier) = notifier {
        orchestrator = orchestrator.with_notifier(notifier);
    }
    Ok(orchestrator)
}
