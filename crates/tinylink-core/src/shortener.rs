use crate::context::Context;
use crate::link::Link;
use crate::repository::Stats;
use crate::shortcode::ShortCode;
use crate::user::UserId;
use async_trait::async_trait;

type Result<T> = std::result::Result<T, crate::error::ShortenerError>;

/// Outcome of a successful registration.
///
/// Both variants carry one link per requested URL, in request order.
/// Links that already existed are returned as stored, so the caller
/// always gets the canonical row for every code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Every requested URL produced a new link.
    Created(Vec<Link>),
    /// At least one requested URL had been shortened before.
    Existing(Vec<Link>),
}

impl Registration {
    pub fn links(&self) -> &[Link] {
        match self {
            Registration::Created(links) | Registration::Existing(links) => links,
        }
    }

    pub fn into_links(self) -> Vec<Link> {
        match self {
            Registration::Created(links) | Registration::Existing(links) => links,
        }
    }

    /// Returns `true` if any link was already stored before this call.
    pub fn is_existing(&self) -> bool {
        matches!(self, Registration::Existing(_))
    }
}

/// The operations transport adapters call into.
#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Shortens every URL in `long_urls` on behalf of `user`.
    async fn register(
        &self,
        ctx: &Context,
        long_urls: Vec<String>,
        user: &UserId,
    ) -> Result<Registration>;

    /// Resolves a short code, deleted links included.
    async fn get_short(&self, ctx: &Context, code: &ShortCode) -> Result<Link>;

    /// All links of `user`. A user without links is reported as not found.
    async fn list_by_owner(&self, ctx: &Context, user: &UserId) -> Result<Vec<Link>>;

    /// Marks the requested codes as deleted, restricted to codes `user` owns.
    async fn mark_as_deleted(&self, ctx: &Context, user: &UserId, codes: Vec<ShortCode>)
        -> Result<()>;

    async fn health_check(&self, ctx: &Context) -> Result<()>;

    async fn stats(&self, ctx: &Context) -> Result<Stats>;
}
