//! Identifier types shared across engine components.
//!
//! Durable entities (accounts, egress paths, heavyweight resources) get
//! UUID-backed identities so records survive process restarts without
//! coordination. Tasks are ephemeral and use a per-runner `u64` counter.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for an ephemeral runner task.
pub type TaskId = u64;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID (e.g. loaded from storage).
            #[must_use]
            pub const fn from_uuid(raw: Uuid) -> Self {
                Self(raw)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id! {
    /// Identifier for a worker account record.
    AccountId
}

uuid_id! {
    /// Identifier for a network egress path record.
    PathId
}

uuid_id! {
    /// Identifier for a pooled heavyweight resource.
    ResourceId
}
