use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Longest client-supplied id accepted.
pub const MAX_ID_LENGTH: usize = 128;

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.|:-]{0,127}$").expect("valid regex"));

/// Opaque entity identifier. Immutable once the entity exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Server-assigned id: a UUID v4 in 32-char lowercase hex.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Accept a client-supplied id.
    ///
    /// Ids start with an alphanumeric character, are at most
    /// [`MAX_ID_LENGTH`] characters, and otherwise contain only
    /// alphanumerics and `_ . | : -`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if ID_RE.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(CoreError::Validation(format!("invalid entity id '{raw}'")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque version token used for optimistic concurrency.
///
/// A fresh token is issued on every mutation; tokens are only ever compared
/// for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap a token observed by a client. Empty tokens are rejected.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation("version must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
