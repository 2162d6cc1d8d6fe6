use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Opaque, stable identity of the caller, supplied by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A user row, for backends that track users explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// When the backend first saw this user.
    pub created_at: Timestamp,
}

impl User {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            created_at: Timestamp::now(),
        }
    }
}
