use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error(
    "Invalid id {value:?}: ids must be a single path segment (no '/', '\\\\', NUL, '.' or '..')"
)]
pub struct IdError {
    value: String,
}

/// Opaque identifier for users, lots, dividends and snapshots.
///
/// File-backed storage uses user ids as directory names, so ids coming from
/// outside the process should go through [`Id::from_string_checked`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl Id {
    const SNAPSHOT_NAMESPACE: Uuid = Uuid::from_u128(0x3f1c2a64_8d0e_5b7a_9c41_6e2d7b5a0f13);

    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_string_checked(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if Self::is_path_safe(&value) {
            Ok(Self(value))
        } else {
            Err(IdError { value })
        }
    }

    /// Deterministic id for the snapshot of `user_id` on `date`.
    ///
    /// Two captures for the same user and day always produce the same id.
    pub fn for_snapshot(user_id: &Id, date: NaiveDate) -> Self {
        let key = format!("{}|{}", user_id.as_str(), date.format("%Y-%m-%d"));
        Self(Uuid::new_v5(&Self::SNAPSHOT_NAMESPACE, key.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_path_safe(value: &str) -> bool {
        if value.is_empty() || value == "." || value == ".." {
            return false;
        }
        !value.chars().any(|c| c == '/' || c == '\\' || c == '\0')
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
