//! Benchmarks for the fleet engine hot paths.
//!
//! Covers:
//! - Account claim/release cycles on the in-memory store
//! - Pool leaf acquire/release throughput
//! - End-to-end runner dispatch of no-op task batches

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use async_trait::async_trait;
use prometheus_fleet::config::{PoolConfig, RunnerConfig};
use prometheus_fleet::core::{
    AccountStatus, AccountStore, ConnectivityProbe, EgressPath, EgressStore, EngineError,
    Heavyweight, JobOutcome, PathStatus, ResourceFactory, ResourcePool, RunnerEvent, TaskContext,
    TaskOp, TaskRunner,
};
use prometheus_fleet::infra::{InMemoryAccountStore, InMemoryEgressStore};
use prometheus_fleet::runtime::TokioSpawner;
use prometheus_fleet::util::ids::ResourceId;
use tokio::runtime::Runtime;

struct BenchResource(ResourceId);

impl Heavyweight for BenchResource {
    type Leaf = usize;

    fn id(&self) -> ResourceId {
        self.0
    }
}

struct BenchFactory {
    leaves: usize,
}

#[async_trait]
impl ResourceFactory for BenchFactory {
    type Resource = BenchResource;

    async fn build(&self, _path: &EgressPath) -> Result<(BenchResource, Vec<usize>), EngineError> {
        Ok((BenchResource(ResourceId::new()), (0..self.leaves).collect()))
    }
}

struct AlwaysUpProbe;

#[async_trait]
impl ConnectivityProbe for AlwaysUpProbe {
    async fn probe(&self, _path: &EgressPath) -> bool {
        true
    }
}

struct NoopOp;

#[async_trait]
impl TaskOp for NoopOp {
    async fn execute(&self, _ctx: &TaskContext) -> Result<(), EngineError> {
        Ok(())
    }
}

fn bench_account_claims(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let store = Arc::new(InMemoryAccountStore::new());
    rt.block_on(async {
        for i in 0..64 {
            let mut account =
                prometheus_fleet::core::WorkerAccount::new(format!("user-{i}"), "bench");
            account.status = AccountStatus::Live;
            store.insert(account).await.unwrap();
        }
    });

    let mut group = c.benchmark_group("account_store");
    group.throughput(Throughput::Elements(1));
    group.bench_function("claim_release_cycle", |b| {
        b.to_async(&rt).iter(|| {
            let store = Arc::clone(&store);
            async move {
                let claimed = store
                    .claim_live("bench", &HashSet::new(), 1)
                    .await
                    .unwrap()
                    .expect("an account is always live");
                let mut account = claimed;
                account.record_job(JobOutcome::Success, 3, 5);
                store.update(&account).await.unwrap();
            }
        });
    });
    group.finish();
}

fn bench_pool_acquire_release(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let pool = rt.block_on(async {
        let paths = Arc::new(InMemoryEgressStore::new());
        let mut path = EgressPath::new("bench:3128");
        path.status = PathStatus::Available;
        paths.insert(path).await.unwrap();
        let pool = ResourcePool::new(
            PoolConfig::new().with_size(1).with_leaves_per_resource(8),
            BenchFactory { leaves: 8 },
            Arc::new(AlwaysUpProbe),
            paths as Arc<dyn EgressStore>,
            TokioSpawner::current(),
        );
        pool.init().await.unwrap();
        pool
    });

    let mut group = c.benchmark_group("resource_pool");
    group.throughput(Throughput::Elements(1));
    group.bench_function("acquire_release", |b| {
        b.to_async(&rt).iter(|| {
            let pool = pool.clone();
            async move {
                let guard = pool.acquire().await.unwrap();
                pool.release(guard);
            }
        });
    });
    group.finish();
}

fn bench_runner_batches(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("task_runner");
    for batch in [16_u64, 64, 256] {
        group.throughput(Throughput::Elements(batch));
        group.bench_with_input(BenchmarkId::new("noop_batch", batch), &batch, |b, &batch| {
            b.to_async(&rt).iter(|| async move {
                let cfg = RunnerConfig::new()
                    .with_concurrency(8)
                    .with_task_delay(Duration::ZERO)
                    .with_retries(1)
                    .with_max_errors(u32::MAX);
                let runner = TaskRunner::new(cfg, TokioSpawner::current());
                let mut rx = runner.subscribe();
                let ops: Vec<Arc<dyn TaskOp>> = (0..batch)
                    .map(|_| Arc::new(NoopOp) as Arc<dyn TaskOp>)
                    .collect();
                runner.add_tasks(ops);
                runner.start();
                loop {
                    if let RunnerEvent::Ended { .. } = rx.recv().await.expect("stream open") {
                        break;
                    }
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_account_claims,
    bench_pool_acquire_release,
    bench_runner_batches
);
criterion_main!(benches);
