//! Store backends for worker accounts and egress paths.

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryAccountStore, InMemoryEgressStore};
pub use postgres::{PostgresAccountStore, PostgresEgressStore};
