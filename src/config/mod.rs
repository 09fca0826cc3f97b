//! Configuration models for the runner, pools, health policy, and jobs.

pub mod engine;

pub use engine::{
    EngineConfig, HealthConfig, OrchestratorConfig, PoolConfig, RunnerConfig,
};
