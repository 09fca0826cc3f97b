//! Infrastructure adapters for durable account and egress-path storage.

pub mod store;

pub use store::{
    InMemoryAccountStore, InMemoryEgressStore, PostgresAccountStore, PostgresEgressStore,
};
