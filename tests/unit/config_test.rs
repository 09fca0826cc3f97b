//! Tests for configuration validation and env loading

use std::time::Duration;

use prometheus_fleet::config::{EngineConfig, HealthConfig, OrchestratorConfig, PoolConfig, RunnerConfig};

#[test]
fn default_engine_config_is_valid() {
    assert!(EngineConfig::default().validate().is_ok());
}

#[test]
fn section_errors_carry_their_section() {
    let mut cfg = EngineConfig::default();
    cfg.pool = PoolConfig::new().with_size(0);
    let err = cfg.validate().unwrap_err();
    assert!(err.starts_with("pool:"), "got: {err}");
}

#[test]
fn health_thresholds_must_be_positive() {
    assert!(HealthConfig::new().with_die_streak_limit(0).validate().is_err());
    assert!(HealthConfig::new()
        .with_rest_error_threshold(0)
        .validate()
        .is_err());
}

#[test]
fn orchestrator_needs_at_least_one_attempt() {
    assert!(OrchestratorConfig::new()
        .with_max_account_attempts(0)
        .validate()
        .is_err());
}

#[test]
fn runner_rejects_zero_timeout() {
    assert!(RunnerConfig::new()
        .with_task_timeout(Duration::ZERO)
        .validate()
        .is_err());
}

// Env mutations are process-global, so both from_env cases share one test.
#[test]
fn env_overrides_apply_and_bad_values_error() {
    std::env::set_var("FLEET_CONCURRENCY", "3");
    std::env::set_var("FLEET_RETRIES", "9");
    std::env::set_var("FLEET_POOL_SIZE", "6");
    std::env::set_var("FLEET_ACQUIRE_RETRY_MS", "1250");

    let cfg = EngineConfig::from_env().unwrap();
    assert_eq!(cfg.runner.concurrency, 3);
    assert_eq!(cfg.runner.retries, 9);
    assert_eq!(cfg.pool.size, 6);
    assert_eq!(
        cfg.orchestrator.acquire_retry_delay,
        Duration::from_millis(1250)
    );

    std::env::set_var("FLEET_MAX_ERRORS", "plenty");
    assert!(EngineConfig::from_env().is_err());

    for key in [
        "FLEET_CONCURRENCY",
        "FLEET_RETRIES",
        "FLEET_POOL_SIZE",
        "FLEET_ACQUIRE_RETRY_MS",
        "FLEET_MAX_ERRORS",
    ] {
        std::env::remove_var(key);
    }
}
