//! Opaque identifiers bound to the lifetime of a run.
//!
//! `OrgId`/`UserId`/`SessionId`/`ThreadId` are newtypes over `String` rather
//! than raw strings passed around positionally — a coordinator call that
//! accidentally swaps `session_id` and `thread_id` (both opaque strings at
//! the wire boundary) fails to compile instead of silently misbehaving.
//! `ActionId` additionally carries identity: it is minted fresh per effect.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

opaque_id!(OrgId, "Organization identifier, opaque for the lifetime of a run.");
opaque_id!(UserId, "The acting user's identifier.");
opaque_id!(SessionId, "Chat session identifier; scopes the entity graph and resolver cache.");
opaque_id!(ThreadId, "Conversation thread identifier; scopes checkpoints.");

/// A freshly generated identifier for one outbound effect (one CRM write).
///
/// Generated as a UUIDv4 even though it is serialized (and compared) as an
/// opaque string everywhere it crosses a wire boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_ids_round_trip_through_string() {
        let org = OrgId::from("org-42");
        assert_eq!(org.as_str(), "org-42");
        assert_eq!(org.to_string(), "org-42");
    }

    #[test]
    fn action_ids_are_unique() {
        let a = ActionId::new();
        let b = ActionId::new();
        assert_ne!(a, b);
    }
}
