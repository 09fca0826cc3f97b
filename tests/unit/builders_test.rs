//! Tests for the engine builders

use std::sync::Arc;

use async_trait::async_trait;
use prometheus_fleet::builders::{build_orchestrator, build_pool, build_runner};
use prometheus_fleet::config::EngineConfig;
use prometheus_fleet::core::{
    AccountStore, ConnectivityProbe, EgressPath, EgressStore, EngineError, Heavyweight,
    ResourceFactory,
};
use prometheus_fleet::infra::{InMemoryAccountStore, InMemoryEgressStore};
use prometheus_fleet::runtime::TokioSpawner;
use prometheus_fleet::util::ids::ResourceId;

struct NullResource(ResourceId);

impl Heavyweight for NullResource {
    type Leaf = ();

    fn id(&self) -> ResourceId {
        self.0
    }
}

struct NullFactory;

#[async_trait]
impl ResourceFactory for NullFactory {
    type Resource = NullResource;

    async fn build(&self, _path: &EgressPath) -> Result<(NullResource, Vec<()>), EngineError> {
        Ok((NullResource(ResourceId::new()), vec![()]))
    }
}

struct YesProbe;

#[async_trait]
impl ConnectivityProbe for YesProbe {
    async fn probe(&self, _path: &EgressPath) -> bool {
        true
    }
}

fn invalid_config() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    cfg.runner.concurrency = 0;
    cfg
}

#[tokio::test]
async fn build_runner_validates_config() {
    assert!(build_runner(&EngineConfig::default(), TokioSpawner::current(), None).is_ok());
    assert!(matches!(
        build_runner(&invalid_config(), TokioSpawner::current(), None),
        Err(EngineError::Backend(_))
    ));
}

#[tokio::test]
async fn build_pool_validates_config() {
    let paths = Arc::new(InMemoryEgressStore::new()) as Arc<dyn EgressStore>;
    let pool = build_pool(
        &EngineConfig::default(),
        NullFactory,
        Arc::new(YesProbe),
        Arc::clone(&paths),
        TokioSpawner::current(),
        None,
    )
    .unwrap();
    assert!(pool.is_empty(), "built pools start offline");

    assert!(build_pool(
        &invalid_config(),
        NullFactory,
        Arc::new(YesProbe),
        paths,
        TokioSpawner::current(),
        None,
    )
    .is_err());
}

#[tokio::test]
async fn build_orchestrator_wires_stores() {
    let accounts = Arc::new(InMemoryAccountStore::new()) as Arc<dyn AccountStore>;
    let paths = Arc::new(InMemoryEgressStore::new()) as Arc<dyn EgressStore>;
    assert!(build_orchestrator(&EngineConfig::default(), accounts, paths, None).is_ok());
}
