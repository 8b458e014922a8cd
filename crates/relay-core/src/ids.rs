use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable key identifying one logical client for the lifetime of its
/// connection. Supplied by the transport path (`/ws/{client_id}`) or
/// generated when the path carries none.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Generate a fresh identity for a connection that supplied none.
    pub fn generate() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }

    /// Build an identity from a transport path segment. Empty or
    /// whitespace-only segments map to `anonymous`.
    pub fn from_path_segment(segment: &str) -> Self {
        let trimmed = segment.trim_matches('/').trim();
        if trimmed.is_empty() {
            Self("anonymous".to_owned())
        } else {
            Self(trimmed.to_owned())
        }
    }

    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_prefix() {
        let id = ClientId::generate();
        assert!(id.as_str().starts_with("client_"), "got: {id}");
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = ClientId::generate();
        let b = ClientId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn path_segment_is_trimmed() {
        let id = ClientId::from_path_segment("/client123/");
        assert_eq!(id.as_str(), "client123");
    }

    #[test]
    fn empty_segment_maps_to_anonymous() {
        assert_eq!(ClientId::from_path_segment("").as_str(), "anonymous");
        assert_eq!(ClientId::from_path_segment("/").as_str(), "anonymous");
        assert_eq!(ClientId::from_path_segment("  ").as_str(), "anonymous");
    }

    #[test]
    fn serde_is_transparent() {
        let id = ClientId::from_raw("abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc\"");
        let parsed: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
