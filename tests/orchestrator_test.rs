//! Integration tests for the orchestrator and health machinery.
//!
//! These validate the job-level contract end to end:
//! 1. Cross-account fallback excludes failed accounts and prefers LRU claims
//! 2. Exhaustion surfaces a terminal failure carrying the last account
//! 3. Job and check outcomes drive the account state machine
//! 4. Held egress paths are released on every exit

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus_fleet::config::{HealthConfig, OrchestratorConfig};
use prometheus_fleet::core::{
    share_notifier, AccountStatus, AccountStore, EgressPath, EgressStore, EngineError,
    HealthService, JobPayload, JobSpec, Orchestrator, PathStatus, StepLogger, WorkerAccount,
};
use prometheus_fleet::infra::{InMemoryAccountStore, InMemoryEgressStore};

/// Payload whose verdict is scripted per username.
struct ScriptedJob {
    failing: HashSet<String>,
    auth_rejecting: HashSet<String>,
}

impl ScriptedJob {
    fn failing_for(users: &[&str]) -> Self {
        Self {
            failing: users.iter().map(ToString::to_string).collect(),
            auth_rejecting: HashSet::new(),
        }
    }

    fn auth_rejecting_for(users: &[&str]) -> Self {
        Self {
            failing: HashSet::new(),
            auth_rejecting: users.iter().map(ToString::to_string).collect(),
        }
    }
}

#[async_trait]
impl JobPayload for ScriptedJob {
    type Output = String;

    async fn execute(
        &self,
        account: &WorkerAccount,
        log: &StepLogger,
    ) -> Result<String, EngineError> {
        log.step("work", serde_json::json!({ "user": account.username }));
        if self.auth_rejecting.contains(&account.username) {
            return Err(EngineError::AuthRejected);
        }
        if self.failing.contains(&account.username) {
            return Err(EngineError::Transient("remote balked".into()));
        }
        Ok(format!("done-by-{}", account.username))
    }
}

struct Fixture {
    accounts: Arc<InMemoryAccountStore>,
    paths: Arc<InMemoryEgressStore>,
    health: Arc<HealthService>,
    orchestrator: Orchestrator,
    notifier: SharedInMemory,
}

type SharedInMemory = Arc<parking_lot::Mutex<Vec<String>>>;

/// Notifier adapter capturing notice names for assertions.
struct CapturingNotifier {
    seen: SharedInMemory,
}

impl prometheus_fleet::core::Notifier for CapturingNotifier {
    fn notify(&mut self, notice: prometheus_fleet::core::Notice) {
        self.seen.lock().push(notice.name);
    }
}

fn fixture(cfg: OrchestratorConfig) -> Fixture {
    let accounts = Arc::new(InMemoryAccountStore::new());
    let paths = Arc::new(InMemoryEgressStore::new());
    let seen: SharedInMemory = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let notifier = share_notifier(Box::new(CapturingNotifier {
        seen: Arc::clone(&seen),
    }));
    let health = Arc::new(
        HealthService::new(
            Arc::clone(&accounts) as Arc<dyn AccountStore>,
            Arc::clone(&paths) as Arc<dyn EgressStore>,
            HealthConfig::new(),
        )
        .with_notifier(Arc::clone(&notifier)),
    );
    let orchestrator = Orchestrator::new(
        Arc::clone(&accounts) as Arc<dyn AccountStore>,
        Arc::clone(&health),
        cfg,
    )
    .with_notifier(notifier);
    Fixture {
        accounts,
        paths,
        health,
        orchestrator,
        notifier: seen,
    }
}

async fn seed_live(store: &InMemoryAccountStore, username: &str, last_used_ms: u128) -> WorkerAccount {
    let mut account = WorkerAccount::new(username, "retail");
    account.status = AccountStatus::Live;
    account.last_used_ms = last_used_ms;
    store.insert(account.clone()).await.unwrap();
    account
}

fn spec() -> JobSpec {
    JobSpec {
        category: "retail".into(),
        label: "order-1234".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn first_attempt_success_releases_account_live() {
    let fx = fixture(OrchestratorConfig::new().with_max_account_attempts(3));
    let seeded = seed_live(&fx.accounts, "alice", 10).await;

    let out = fx
        .orchestrator
        .run(&spec(), &ScriptedJob::failing_for(&[]))
        .await
        .unwrap();
    assert_eq!(out, "done-by-alice");

    let stored = fx.accounts.get(seeded.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AccountStatus::Live);
    assert_eq!(stored.success_count, 1);
    assert_eq!(stored.error_count, 0);
    assert!(stored.last_used_ms > 10);
    assert!(fx.notifier.lock().iter().any(|n| n == "job:ended"));
}

#[tokio::test(start_paused = true)]
async fn fallback_claims_lru_first_and_excludes_failures() {
    let fx = fixture(OrchestratorConfig::new().with_max_account_attempts(3));
    let older = seed_live(&fx.accounts, "older", 10).await;
    let newer = seed_live(&fx.accounts, "newer", 500).await;

    // The LRU account fails; the job falls back to the other one.
    let out = fx
        .orchestrator
        .run(&spec(), &ScriptedJob::failing_for(&["older"]))
        .await
        .unwrap();
    assert_eq!(out, "done-by-newer");

    let failed = fx.accounts.get(older.id).await.unwrap().unwrap();
    assert_eq!(failed.status, AccountStatus::Live);
    assert_eq!(failed.error_count, 1);

    let succeeded = fx.accounts.get(newer.id).await.unwrap().unwrap();
    assert_eq!(succeeded.success_count, 1);
}

#[tokio::test(start_paused = true)]
async fn exhaustion_carries_last_account() {
    let fx = fixture(
        OrchestratorConfig::new()
            .with_max_account_attempts(3)
            .with_acquire_retry_delay(Duration::from_millis(100)),
    );
    let only = seed_live(&fx.accounts, "solo", 10).await;

    let err = fx
        .orchestrator
        .run(&spec(), &ScriptedJob::failing_for(&["solo"]))
        .await
        .unwrap_err();
    match err {
        EngineError::Terminal(failure) => {
            let last = failure.last_account.expect("last account must ride along");
            assert_eq!(last.id, only.id);
        }
        other => panic!("expected terminal failure, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn auth_rejection_maps_account_to_die() {
    let fx = fixture(
        OrchestratorConfig::new()
            .with_max_account_attempts(2)
            .with_acquire_retry_delay(Duration::from_millis(100)),
    );
    let seeded = seed_live(&fx.accounts, "locked-out", 10).await;

    let err = fx
        .orchestrator
        .run(&spec(), &ScriptedJob::auth_rejecting_for(&["locked-out"]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Terminal(_)));

    let stored = fx.accounts.get(seeded.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AccountStatus::Die);
    assert_eq!(stored.die_streak, 1);
}

#[tokio::test(start_paused = true)]
async fn held_path_is_released_on_failure_exit() {
    let fx = fixture(OrchestratorConfig::new().with_max_account_attempts(1));
    let seeded = seed_live(&fx.accounts, "path-holder", 10).await;

    let mut path = EgressPath::new("10.1.1.1:3128");
    path.status = PathStatus::Available;
    path.last_checked_ms = 5;
    let path_id = path.id;
    fx.paths.insert(path).await.unwrap();

    let attached = fx.health.attach_path(seeded.id).await.unwrap();
    assert_eq!(attached, Some(path_id));
    assert_eq!(
        fx.paths.get(path_id).await.unwrap().unwrap().status,
        PathStatus::Validating
    );

    let err = fx
        .orchestrator
        .run(&spec(), &ScriptedJob::failing_for(&["path-holder"]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Terminal(_)));

    // The failure exit still released the held path and cleared the hold.
    let stored_path = fx.paths.get(path_id).await.unwrap().unwrap();
    assert_eq!(stored_path.status, PathStatus::Available);
    let stored_account = fx.accounts.get(seeded.id).await.unwrap().unwrap();
    assert!(stored_account.egress_path.is_none());
}

#[tokio::test(start_paused = true)]
async fn die_streak_limit_removes_account_and_frees_path() {
    let fx = fixture(OrchestratorConfig::new());
    let mut account = WorkerAccount::new("doomed", "retail");
    account.die_streak = 4;
    let id = account.id;
    fx.accounts.insert(account).await.unwrap();

    let mut path = EgressPath::new("10.9.9.9:3128");
    path.status = PathStatus::Available;
    let path_id = path.id;
    fx.paths.insert(path).await.unwrap();

    let claimed = fx.health.claim_for_check("retail").await.unwrap().unwrap();
    assert_eq!(claimed.id, id);
    fx.health.attach_path(id).await.unwrap();

    // The fifth consecutive failed login removes the account for good and
    // still frees the held path.
    let status = fx.health.record_check(id, false).await.unwrap();
    assert_eq!(status, AccountStatus::Error);
    assert_eq!(
        fx.paths.get(path_id).await.unwrap().unwrap().status,
        PathStatus::Available
    );
    assert!(fx.notifier.lock().iter().any(|n| n == "account:removed"));

    // Removed accounts are invisible to every claim.
    assert!(fx.health.claim_for_check("retail").await.unwrap().is_none());
    assert!(fx
        .accounts
        .claim_live("retail", &HashSet::new(), 1)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn acquisition_miss_backs_off_until_an_account_turns_live() {
    let fx = fixture(
        OrchestratorConfig::new()
            .with_max_account_attempts(5)
            .with_acquire_retry_delay(Duration::from_secs(1)),
    );
    // Seed an account that is not yet eligible for work.
    let account = WorkerAccount::new("late-bloomer", "retail");
    let id = account.id;
    fx.accounts.insert(account).await.unwrap();

    // A health-check driver brings it Live while the job is backing off.
    let health = Arc::clone(&fx.health);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        let claimed = health.claim_for_check("retail").await.unwrap().unwrap();
        health.record_check(claimed.id, true).await.unwrap();
    });

    let out = fx
        .orchestrator
        .run(&spec(), &ScriptedJob::failing_for(&[]))
        .await
        .unwrap();
    assert_eq!(out, "done-by-late-bloomer");
    let stored = fx.accounts.get(id).await.unwrap().unwrap();
    assert_eq!(stored.success_count, 1);
}

#[tokio::test]
async fn step_logger_forwards_to_sink() {
    let seen: Arc<parking_lot::Mutex<Vec<String>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    let log = StepLogger::new("order-42").with_sink(Box::new(move |name, detail| {
        sink_seen.lock().push(format!("{name}:{detail}"));
    }));

    log.step("navigate", serde_json::json!({ "page": "checkout" }));
    log.step("submit", serde_json::json!({ "ok": true }));

    let steps = seen.lock();
    assert_eq!(steps.len(), 2);
    assert!(steps[0].starts_with("navigate:"));
}
