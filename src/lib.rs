//! # Prometheus Fleet
//!
//! A concurrency-bounded task-execution engine with multi-level resource
//! pooling for automation fleets.
//!
//! This library is the scheduling and pooling core of a browser-automation
//! platform: it drives batches of opaque asynchronous operations under a
//! concurrency cap, hands out scarce, failure-prone leaf resources (browser
//! pages, health-checked worker accounts, probed network egress paths), and
//! recovers from partial failure without operator involvement.
//!
//! ## Core Problem Solved
//!
//! Automation workloads run against resources that fail routinely:
//!
//! - **Browsers crash**: a heavyweight browser process owns several pages and
//!   can disappear mid-run, voiding every page it handed out
//! - **Egress paths rot**: outbound proxies die silently and must be probed
//!   before any resource is built over them
//! - **Accounts burn out**: worker accounts get locked out, need rest after
//!   error streaks, and must be retired after consecutive failed logins
//! - **Work must keep flowing**: one bad task, account, or proxy must never
//!   take down a batch
//!
//! ## Key Features
//!
//! - **Bounded execution**: FIFO dispatch under a soft concurrency cap, with
//!   per-attempt timeouts, fixed-delay iterative retries, and a cumulative
//!   error circuit breaker ([`core::TaskRunner`])
//! - **Parked acquisition**: leaf checkout suspends callers FIFO when the pool
//!   is exhausted and hands released leaves directly to the oldest waiter
//!   ([`core::ResourcePool`])
//! - **Supervised respawn**: crashed resources are replaced after a cooldown,
//!   bound to the first egress path that survives a connectivity probe
//! - **Health-governed membership**: account and path state machines decide
//!   pool membership; held paths are always released on exit
//!   ([`core::HealthService`])
//! - **Cross-account fallback**: one unit of work retries across accounts via
//!   atomic store claims until it completes or exhausts its attempt budget
//!   ([`core::Orchestrator`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prometheus_fleet::builders::build_orchestrator;
//! use prometheus_fleet::config::EngineConfig;
//! use prometheus_fleet::core::JobSpec;
//! use prometheus_fleet::infra::{InMemoryAccountStore, InMemoryEgressStore};
//! use std::sync::Arc;
//!
//! let cfg = EngineConfig::from_env()?;
//! let accounts = Arc::new(InMemoryAccountStore::new());
//! let paths = Arc::new(InMemoryEgressStore::new());
//! let orchestrator = build_orchestrator(&cfg, accounts, paths, None)?;
//!
//! let spec = JobSpec {
//!     category: "retail".into(),
//!     label: "order-1234".into(),
//! };
//! let outcome = orchestrator.run(&spec, &my_payload).await?;
//! ```
//!
//! For complete examples, see the integration tests under `tests/`.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core engine: runner, pools, health machinery, and orchestration.
pub mod core;
/// Configuration models for the runner, pools, health policy, and jobs.
pub mod config;
/// Builders to construct engine services from configuration.
pub mod builders;
/// Infrastructure adapters for durable account and egress-path storage.
pub mod infra;
/// Runtime adapters behind the engine's spawn seam.
pub mod runtime;
/// Shared utilities.
pub mod util;
