//! Typed identifiers for tasks, projects, trees and agents.
//!
//! `TaskId` is either a free-form string or the canonical `YYYYMMDDNNN`
//! form (date prefix + 3-digit counter), per §3 of the specification.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{OrchestratorError, Result};

/// A task identifier: either the canonical date-prefixed counter form,
/// or an opaque free-form string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskId {
    Canonical { date: NaiveDate, counter: u16 },
    Free(String),
}

impl TaskId {
    /// Build a canonical id from today's date and an integer counter.
    pub fn from_int(counter: u16) -> Self {
        Self::Canonical {
            date: Local::now().date_naive(),
            counter,
        }
    }

    /// Parse a string into a `TaskId`, validating shape and rejecting
    /// empty input.
    pub fn from_string(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(OrchestratorError::empty_field("task_id"));
        }
        if let Some(canonical) = Self::try_parse_canonical(raw) {
            return Ok(canonical);
        }
        Ok(Self::Free(raw.to_string()))
    }

    fn try_parse_canonical(raw: &str) -> Option<Self> {
        if raw.len() != 11 || !raw.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let date = NaiveDate::parse_from_str(&raw[0..8], "%Y%m%d").ok()?;
        let counter: u16 = raw[8..11].parse().ok()?;
        Some(Self::Canonical { date, counter })
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self, Self::Canonical { .. })
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canonical { date, counter } => {
                write!(f, "{}{:03}", date.format("%Y%m%d"), counter)
            }
            Self::Free(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for TaskId {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

impl Serialize for TaskId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::from_string(&raw).map_err(serde::de::Error::custom)
    }
}

macro_rules! string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Result<Self> {
                let raw = raw.into();
                if raw.trim().is_empty() {
                    return Err(OrchestratorError::empty_field(stringify!($name)));
                }
                Ok(Self(raw))
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

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

string_id!(ProjectId, "A project identifier.");
string_id!(TreeId, "A task-tree identifier (analogous to a git branch).");
string_id!(AgentId, "An agent identifier, usually prefixed with '@' in call_agent form.");
string_id!(UserId, "A user identifier, defaults to \"default_id\" at the tool surface.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_form() {
        let id = TaskId::from_string("20260115007").unwrap();
        assert!(id.is_canonical());
        assert_eq!(id.to_string(), "20260115007");
    }

    #[test]
    fn falls_back_to_free_form() {
        let id = TaskId::from_string("fix-login-bug").unwrap();
        assert!(!id.is_canonical());
        assert_eq!(id.to_string(), "fix-login-bug");
    }

    #[test]
    fn rejects_empty() {
        assert!(TaskId::from_string("").is_err());
        assert!(TaskId::from_string("   ").is_err());
    }

    #[test]
    fn from_int_uses_todays_date() {
        let id = TaskId::from_int(7);
        match id {
            TaskId::Canonical { counter, .. } => assert_eq!(counter, 7),
            TaskId::Free(_) => panic!("expected canonical id"),
        }
    }

    #[test]
    fn string_ids_reject_empty() {
        assert!(ProjectId::new("").is_err());
        assert!(ProjectId::new("web_app").is_ok());
    }
}
