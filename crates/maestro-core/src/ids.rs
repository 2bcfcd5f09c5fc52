use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a participant on the message hub: a worker or a coordinator.
///
/// Ordering is lexicographic on the underlying string, which is what the
/// assignment policies use to break ties deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier with the given prefix, e.g. `coder-1b4e...`.
    pub fn generate(prefix: &str) -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        if prefix.is_empty() {
            Self(uuid)
        } else {
            Self(format!("{prefix}-{}", &uuid[..12]))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uses_prefix() {
        let id = AgentId::generate("coder");
        assert!(id.as_str().starts_with("coder-"));
        assert_eq!(id.as_str().len(), "coder-".len() + 12);
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let mut ids = vec![AgentId::from("b"), AgentId::from("a"), AgentId::from("c")];
        ids.sort();
        assert_eq!(ids, vec![AgentId::from("a"), AgentId::from("b"), AgentId::from("c")]);
    }

    #[test]
    fn test_blank_id_is_empty() {
        assert!(AgentId::from("  ").is_empty());
        assert!(!AgentId::from("w1").is_empty());
    }
}
