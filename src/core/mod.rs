//! Core engine: runner, pools, health machinery, and orchestration.

pub mod error;
pub mod health;
pub mod notify;
pub mod orchestrator;
pub mod pool;
pub mod runner;
pub mod task;

pub use error::{AppResult, EngineError, TerminalFailure};
pub use health::{
    AccountStatus, AccountStore, EgressPath, EgressStore, HealthService, JobOutcome, PathStatus,
    WorkerAccount,
};
pub use notify::{
    build_notice, share_notifier, InMemoryNotifier, LogNotifier, Notice, Notifier, SharedNotifier,
};
pub use orchestrator::{JobPayload, JobSpec, Orchestrator, StepLogger};
pub use pool::{ConnectivityProbe, Heavyweight, LeafGuard, ResourceFactory, ResourcePool};
pub use runner::{RunnerCounts, RunnerEvent, RunnerStatus, Spawn, TaskRunner};
pub use task::{QueuedTask, TaskContext, TaskOp};
