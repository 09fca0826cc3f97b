//! Tests for the runtime spawner

use prometheus_fleet::core::Spawn;
use prometheus_fleet::runtime::TokioSpawner;

#[tokio::test]
async fn current_spawner_runs_futures() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    TokioSpawner::current().spawn(async move {
        let _ = tx.send(21 * 2);
    });
    assert_eq!(rx.await.unwrap(), 42);
}

#[tokio::test]
async fn owned_runtime_outlives_construction() {
    let spawner = TokioSpawner::with_worker_threads(1).unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        let _ = tx.send("alive");
    });
    assert_eq!(rx.await.unwrap(), "alive");
}
