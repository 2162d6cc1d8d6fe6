use crate::shortcode::ShortCode;
use crate::user::UserId;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

/// Time-ordered unique identifier of a [`Link`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(Uuid);

impl LinkId {
    /// Allocates a new UUIDv7, which sorts by creation time.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// A stored mapping from a short code to a long URL.
///
/// Everything but `is_deleted` is fixed at creation, and `is_deleted`
/// only ever goes from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub short_code: ShortCode,
    pub long_url: String,
    pub owner_id: UserId,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Link {
    /// Builds a fresh, not yet stored link for `long_url` owned by `owner_id`.
    pub fn new(long_url: impl Into<String>, owner_id: UserId) -> Self {
        let long_url = long_url.into();
        Self {
            id: LinkId::new(),
            short_code: ShortCode::from_url(&long_url),
            long_url,
            owner_id,
            is_deleted: false,
        }
    }
}
