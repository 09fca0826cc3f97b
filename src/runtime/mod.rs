//! Runtime adapters behind the engine's spawn seam.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;
