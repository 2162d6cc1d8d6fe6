use crate::deletion::{self, DeletionTask};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tinylink_core::{
    Context, Link, LinkRepository, Registration, ShortCode, Shortener, ShortenerError, Stats,
    StorageError, StorageResultExt, UserId,
};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

/// Default budget for a detached deletion.
pub const DEFAULT_BACKGROUND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceSettings {
    /// Filter workers used by the deletion pipeline.
    #[builder(default = deletion::default_workers())]
    pub deletion_workers: usize,
    /// Deadline applied to deletions started with
    /// [`LinkService::spawn_mark_as_deleted`].
    #[builder(default = DEFAULT_BACKGROUND_TIMEOUT)]
    pub background_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A concrete implementation of the [`Shortener`] trait.
///
/// Short codes are derived from the URL itself, so registering the same
/// URL twice yields the same code. The first owner keeps it.
#[derive(Debug)]
pub struct LinkService<R> {
    repository: Arc<R>,
    settings: ServiceSettings,
}

impl<R> Clone for LinkService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            settings: self.settings.clone(),
        }
    }
}

impl<R: LinkRepository> LinkService<R> {
    pub fn new(repository: R) -> Self {
        Self::with_settings(repository, ServiceSettings::default())
    }

    pub fn with_settings(repository: R, settings: ServiceSettings) -> Self {
        Self {
            repository: Arc::new(repository),
            settings,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Starts a deletion that outlives the caller's context.
    ///
    /// The pipeline runs on its own task under a fresh context bounded by
    /// [`ServiceSettings::background_timeout`]. Failures are logged; the
    /// returned handle can also be awaited or cancelled.
    pub fn spawn_mark_as_deleted(&self, user: UserId, codes: Vec<ShortCode>) -> DeletionTask {
        let (ctx, cancel) = Context::with_cancel();
        let ctx = ctx.with_timeout(self.settings.background_timeout);
        let repository = Arc::clone(&self.repository);
        let workers = self.settings.deletion_workers;

        let handle = tokio::spawn(async move {
            let result =
                deletion::mark_as_deleted(&ctx, repository.as_ref(), &user, codes, workers).await;
            if let Err(err) = &result {
                warn!(user = %user, error = %err, "background deletion failed");
            }
            result
        });

        DeletionTask::new(handle, cancel)
    }

    /// Maps every requested URL to its stored row after a partial insert.
    async fn resolve_existing(
        &self,
        ctx: &Context,
        candidates: Vec<Link>,
        inserted: Vec<Link>,
    ) -> Result<Vec<Link>, ShortenerError> {
        let mut known: HashMap<ShortCode, Link> = inserted
            .into_iter()
            .map(|link| (link.short_code.clone(), link))
            .collect();
        let mut links = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let stored = match known.get(&candidate.short_code) {
                Some(stored) => stored.clone(),
                None => {
                    let stored = self
                        .repository
                        .find_by_short_code(ctx, &candidate.short_code)
                        .await
                        .op("register")?;
                    known.insert(stored.short_code.clone(), stored.clone());
                    stored
                }
            };

            if stored.long_url != candidate.long_url {
                warn!(
                    code = %stored.short_code,
                    stored = %stored.long_url,
                    requested = %candidate.long_url,
                    "short code collision"
                );
                return Err(ShortenerError::Collision {
                    code: stored.short_code,
                    stored: stored.long_url,
                    requested: candidate.long_url,
                });
            }

            links.push(stored);
        }

        Ok(links)
    }
}

#[async_trait]
impl<R: LinkRepository> Shortener for LinkService<R> {
    async fn register(
        &self,
        ctx: &Context,
        long_urls: Vec<String>,
        user: &UserId,
    ) -> Result<Registration, ShortenerError> {
        ctx.check()?;

        if let Some(position) = long_urls.iter().position(|url| url.trim().is_empty()) {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL at position {position} is empty"
            )));
        }

        self.repository.ensure_user(ctx, user).await.op("register")?;

        let candidates: Vec<Link> = long_urls
            .into_iter()
            .map(|url| Link::new(url, user.clone()))
            .collect();
        let requested = candidates.len();
        let inserted = self
            .repository
            .batch_insert(ctx, candidates.clone())
            .await
            .op("register")?;

        if inserted.len() == requested {
            info!(user = %user, created = requested, "registered links");
            return Ok(Registration::Created(inserted));
        }

        let created = inserted.len();
        let links = self.resolve_existing(ctx, candidates, inserted).await?;
        info!(
            user = %user,
            requested,
            created,
            existing = requested - created,
            "registered links, some already existed"
        );

        Ok(Registration::Existing(links))
    }

    async fn get_short(&self, ctx: &Context, code: &ShortCode) -> Result<Link, ShortenerError> {
        let link = self
            .repository
            .find_by_short_code(ctx, code)
            .await
            .op("get_short")?;
        debug!(code = %code, deleted = link.is_deleted, "resolved short code");
        Ok(link)
    }

    async fn list_by_owner(
        &self,
        ctx: &Context,
        user: &UserId,
    ) -> Result<Vec<Link>, ShortenerError> {
        let links = match self.repository.select_by_owner(ctx, user).await {
            Ok(links) => links,
            Err(StorageError::NotFound(_)) => Vec::new(),
            Err(err) => return Err(ShortenerError::storage("list_by_owner", err)),
        };

        if links.is_empty() {
            return Err(ShortenerError::NotFound(format!("no links for user {user}")));
        }

        Ok(links)
    }

    async fn mark_as_deleted(
        &self,
        ctx: &Context,
        user: &UserId,
        codes: Vec<ShortCode>,
    ) -> Result<(), ShortenerError> {
        deletion::mark_as_deleted(
            ctx,
            self.repository.as_ref(),
            user,
            codes,
            self.settings.deletion_workers,
        )
        .await?;
        Ok(())
    }

    async fn health_check(&self, ctx: &Context) -> Result<(), ShortenerError> {
        self.repository.health_check(ctx).await.op("health_check")?;
        Ok(())
    }

    async fn stats(&self, ctx: &Context) -> Result<Stats, ShortenerError> {
        self.repository.stats(ctx).await.op("stats")
    }
}
