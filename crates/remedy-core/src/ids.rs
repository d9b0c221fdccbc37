//! Identifier types for remedy.
//!
//! Agents are addressed by a short, human-chosen slug (`self-healing-agent`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of an agent identifier.
const MAX_AGENT_ID_LEN: usize = 63;

/// A unique agent identifier.
///
/// Agent IDs are lowercase slugs (`[a-z0-9-]`, at most 63 characters) so they
/// can double as Kubernetes label values and log field values without escaping.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    /// Parse an `AgentId`, validating the slug format.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is empty, too long, or contains
    /// characters outside `[a-z0-9-]`.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        if id.len() > MAX_AGENT_ID_LEN {
            return Err(IdError::TooLong {
                max: MAX_AGENT_ID_LEN,
                got: id.len(),
            });
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(IdError::InvalidChar(c));
        }
        Ok(Self(id))
    }

    /// Return the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentId({})", self.0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AgentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AgentId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier is empty.
    #[error("identifier must not be empty")]
    Empty,

    /// The identifier exceeds the maximum length.
    #[error("identifier too long: max {max} characters, got {got}")]
    TooLong {
        /// The maximum number of characters.
        max: usize,
        /// The actual number of characters.
        got: usize,
    },

    /// The identifier contains a character outside `[a-z0-9-]`.
    #[error("invalid character {0:?} in identifier")]
    InvalidChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_accepts_slugs() {
        let id = AgentId::new("self-healing-agent").unwrap();
        assert_eq!(id.as_str(), "self-healing-agent");
        assert_eq!(id.to_string(), "self-healing-agent");
    }

    #[test]
    fn agent_id_rejects_empty() {
        assert_eq!(AgentId::new(""), Err(IdError::Empty));
    }

    #[test]
    fn agent_id_rejects_uppercase_and_spaces() {
        assert_eq!(
            AgentId::new("Scaling Agent"),
            Err(IdError::InvalidChar('S'))
        );
        assert_eq!(AgentId::new("scaling agent"), Err(IdError::InvalidChar(' ')));
    }

    #[test]
    fn agent_id_rejects_overlong() {
        let long = "a".repeat(64);
        assert!(matches!(
            AgentId::new(long),
            Err(IdError::TooLong { max: 63, got: 64 })
        ));
    }

    #[test]
    fn agent_id_serde_json() {
        let id = AgentId::new("scaling-agent").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"scaling-agent\"");
        let parsed: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);

        assert!(serde_json::from_str::<AgentId>("\"Not Valid\"").is_err());
    }
}
