use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Session keys double as the `join_key` column in the durable log.
branded_id!(SessionId, "sess");
// Assigned at accept time, before a display name is known.
branded_id!(ConnectionId, "conn");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes() {
        assert!(SessionId::new().as_str().starts_with("sess_"));
        assert!(ConnectionId::new().as_str().starts_with("conn_"));
    }

    #[test]
    fn session_ids_never_repeat() {
        let ids: std::collections::HashSet<SessionId> = (0..1000).map(|_| SessionId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn display_matches_as_str() {
        let id = SessionId::new();
        assert_eq!(id.to_string(), id.as_str());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = SessionId::new();
        assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{id}\""));
    }
}
