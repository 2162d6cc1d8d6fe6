use crate::context::Context;
use crate::error::StorageError;
use crate::link::Link;
use crate::shortcode::ShortCode;
use crate::user::{User, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Aggregate counters over a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Links that have not been marked deleted.
    pub urls: u64,
    /// Users the backend has recorded.
    pub users: u64,
}

/// Storage contract shared by every backend.
///
/// All operations take the caller's [`Context`] and must stop with
/// [`StorageError::Cancelled`] once it is done. A short code is unique
/// within a backend, deleted rows included, and stored rows are never
/// overwritten or physically removed.
#[async_trait]
pub trait LinkRepository: Send + Sync + 'static {
    /// Inserts every link whose short code is not stored yet.
    ///
    /// Links whose code already exists, including duplicates within
    /// `links`, are skipped silently. Returns exactly the newly inserted
    /// links, in input order.
    ///
    /// Whether a failure mid-batch leaves earlier items applied is backend
    /// specific: the relational backend rolls the whole batch back, the
    /// memory and file backends do not partially fail once they started.
    async fn batch_insert(&self, ctx: &Context, links: Vec<Link>) -> Result<Vec<Link>>;

    /// Point lookup. Returns [`StorageError::NotFound`] for unknown codes.
    async fn find_by_short_code(&self, ctx: &Context, code: &ShortCode) -> Result<Link>;

    /// All links owned by `owner`, deleted ones included.
    ///
    /// An owner without links yields an empty vector.
    async fn select_by_owner(&self, ctx: &Context, owner: &UserId) -> Result<Vec<Link>>;

    /// Flags the given rows as deleted and returns how many changed.
    ///
    /// Rows are matched by short code. Callers must already have restricted
    /// `links` to rows the acting user owns.
    async fn mark_deleted(&self, ctx: &Context, links: &[Link]) -> Result<u64>;

    /// Creates the user row if it does not exist yet and returns it.
    async fn ensure_user(&self, ctx: &Context, id: &UserId) -> Result<User>;

    /// Liveness probe for the underlying medium.
    async fn health_check(&self, ctx: &Context) -> Result<()>;

    async fn stats(&self, ctx: &Context) -> Result<Stats>;
}
