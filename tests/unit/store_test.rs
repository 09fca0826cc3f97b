//! Tests for store claim semantics

use std::collections::HashSet;

use prometheus_fleet::core::{
    AccountStatus, AccountStore, EgressPath, EgressStore, PathStatus, WorkerAccount,
};
use prometheus_fleet::infra::{
    InMemoryAccountStore, InMemoryEgressStore, PostgresAccountStore, PostgresEgressStore,
};

#[tokio::test]
async fn check_claim_transitions_to_checking() {
    let store = InMemoryAccountStore::new();
    let account = WorkerAccount::new("fresh", "retail");
    let id = account.id;
    store.insert(account).await.unwrap();

    let claimed = store.claim_for_check("retail").await.unwrap().unwrap();
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.status, AccountStatus::Checking);

    // Checking accounts are not claimable again.
    assert!(store.claim_for_check("retail").await.unwrap().is_none());
}

#[tokio::test]
async fn work_claim_never_sees_resting_accounts() {
    let store = InMemoryAccountStore::new();
    let mut account = WorkerAccount::new("tired", "retail");
    account.status = AccountStatus::Resting;
    store.insert(account).await.unwrap();

    assert!(store
        .claim_live("retail", &HashSet::new(), 1)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn update_of_unknown_account_is_a_backend_error() {
    let store = InMemoryAccountStore::new();
    let phantom = WorkerAccount::new("phantom", "retail");
    assert!(store.update(&phantom).await.is_err());
}

#[tokio::test]
async fn path_claim_prefers_most_recently_validated() {
    let store = InMemoryEgressStore::new();
    let mut stale = EgressPath::new("stale:3128");
    stale.status = PathStatus::Available;
    stale.last_checked_ms = 10;
    let mut fresh = EgressPath::new("fresh:3128");
    fresh.status = PathStatus::Available;
    fresh.last_checked_ms = 800;
    let fresh_id = fresh.id;
    store.insert(stale).await.unwrap();
    store.insert(fresh).await.unwrap();

    let claimed = store.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.id, fresh_id);
    assert_eq!(claimed.status, PathStatus::Validating);
}

#[test]
fn postgres_adapters_ship_schema_and_claim_sql() {
    assert!(PostgresAccountStore::migrations()[0].contains("fleet_accounts"));
    assert!(PostgresAccountStore::claim_live_sql().contains("SKIP LOCKED"));
    assert!(PostgresEgressStore::migrations()[0].contains("fleet_egress_paths"));
    assert!(PostgresEgressStore::claim_next_sql().contains("last_checked_at DESC"));
}
