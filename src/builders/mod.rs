//! Builders to construct engine services from configuration.

pub mod engine_builder;

pub use engine_builder::{build_orchestrator, build_pool, build_runner};
