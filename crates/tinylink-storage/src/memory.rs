use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tinylink_core::repository::{LinkRepository, Result, Stats};
use tinylink_core::{Context, Link, ShortCode, StorageError, User, UserId};
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct State {
    links: HashMap<ShortCode, Link>,
    users: HashMap<UserId, User>,
}

impl State {
    fn owned_by(&self, owner: &UserId) -> Vec<Link> {
        let mut links: Vec<Link> = self
            .links
            .values()
            .filter(|link| &link.owner_id == owner)
            .cloned()
            .collect();
        links.sort_by_key(|link| link.id);
        links
    }
}

/// Volatile repository backed by one map behind a reader/writer lock.
///
/// Inserts and deletions take the write lock, lookups the read lock.
/// Clones share the same map. Nothing survives a restart.
///
/// A batch insert applies items one by one under a single write lock, so
/// it cannot fail halfway once the lock is held.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<RwLock<State>>,
}

impl InMemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory repository with room for `capacity` links.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                links: HashMap::with_capacity(capacity),
                users: HashMap::new(),
            })),
        }
    }
}

#[async_trait]
impl LinkRepository for InMemoryRepository {
    async fn batch_insert(&self, ctx: &Context, links: Vec<Link>) -> Result<Vec<Link>> {
        ctx.check()?;

        let mut state = self.state.write();
        let mut inserted = Vec::with_capacity(links.len());
        for link in links {
            if state.links.contains_key(&link.short_code) {
                trace!(code = %link.short_code, "short code already stored, skipping");
                continue;
            }
            debug!(code = %link.short_code, url = %link.long_url, owner = %link.owner_id, "stored link");
            state.links.insert(link.short_code.clone(), link.clone());
            inserted.push(link);
        }

        Ok(inserted)
    }

    async fn find_by_short_code(&self, ctx: &Context, code: &ShortCode) -> Result<Link> {
        ctx.check()?;

        self.state
            .read()
            .links
            .get(code)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(code.to_string()))
    }

    async fn select_by_owner(&self, ctx: &Context, owner: &UserId) -> Result<Vec<Link>> {
        ctx.check()?;

        Ok(self.state.read().owned_by(owner))
    }

    async fn mark_deleted(&self, ctx: &Context, links: &[Link]) -> Result<u64> {
        ctx.check()?;

        let mut state = self.state.write();
        let mut changed = 0;
        for link in links {
            if let Some(stored) = state.links.get_mut(&link.short_code) {
                if !stored.is_deleted {
                    stored.is_deleted = true;
                    changed += 1;
                }
            }
        }

        debug!(requested = links.len(), changed, "marked links as deleted");
        Ok(changed)
    }

    async fn ensure_user(&self, ctx: &Context, id: &UserId) -> Result<User> {
        ctx.check()?;

        let mut state = self.state.write();
        let user = state
            .users
            .entry(id.clone())
            .or_insert_with(|| User::new(id.clone()));
        Ok(user.clone())
    }

    async fn health_check(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        Ok(())
    }

    async fn stats(&self, ctx: &Context) -> Result<Stats> {
        ctx.check()?;

        let state = self.state.read();
        let urls = state.links.values().filter(|link| !link.is_deleted).count();
        Ok(Stats {
            urls: urls as u64,
            users: state.users.len() as u64,
        })
    }
}
