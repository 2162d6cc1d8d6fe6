use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tinylink_core::repository::{LinkRepository, Result, Stats};
use tinylink_core::{Context, Link, ShortCode, StorageError, User, UserId};
use tokio::sync::RwLock;
use tracing::{debug, info, trace};

/// On-disk layout: every link plus the users seen so far.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    users: BTreeMap<UserId, User>,
}

/// Repository persisted as one pretty-printed JSON document.
///
/// Every mutation reads the whole document, applies the change and
/// replaces the file through a sibling temporary file and a rename, so a
/// reader never observes a half-written document. Access from this
/// process is serialized by a reader/writer lock; other processes
/// touching the same file are not coordinated with.
///
/// Items of a batch are applied independently. Cancellation is observed
/// up to the point the rewrite starts; a started rewrite always finishes
/// while the write lock is still held.
#[derive(Debug, Clone)]
pub struct FileRepository {
    path: PathBuf,
    lock: Arc<RwLock<()>>,
}

impl FileRepository {
    /// Opens the repository at `path`, creating the file and its parent
    /// directories when missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;

        info!(path = %path.display(), "opened file storage");

        Ok(Self {
            path,
            lock: Arc::new(RwLock::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Document> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Document::default()),
            Err(e) => return Err(io_error(&self.path, e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Document::default());
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::InvalidData(format!("{}: {e}", self.path.display()))
        })
    }

    async fn store(&self, document: &Document) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let staging = self.staging_path();
        tokio::fs::write(&staging, &bytes)
            .await
            .map_err(|e| io_error(&staging, e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;

        trace!(path = %self.path.display(), bytes = bytes.len(), "rewrote storage file");
        Ok(())
    }

    /// Last cancellation point of a mutation, then the rewrite itself.
    ///
    /// The rewrite is not raced against `ctx`: the blocking file calls
    /// would keep running after the future is dropped and outlive the lock.
    async fn commit(&self, ctx: &Context, document: &Document) -> Result<()> {
        ctx.check()?;
        self.store(document).await
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_document(&self, ctx: &Context) -> Result<Document> {
        let _guard = ctx.run(self.lock.read()).await?;
        ctx.run(self.load()).await?
    }
}

fn io_error(path: &Path, err: std::io::Error) -> StorageError {
    StorageError::Io(format!("{}: {err}", path.display()))
}

#[async_trait]
impl LinkRepository for FileRepository {
    async fn batch_insert(&self, ctx: &Context, links: Vec<Link>) -> Result<Vec<Link>> {
        let _guard = ctx.run(self.lock.write()).await?;
        let mut document = ctx.run(self.load()).await??;

        let mut known: HashSet<ShortCode> = document
            .links
            .iter()
            .map(|link| link.short_code.clone())
            .collect();

        let mut inserted = Vec::with_capacity(links.len());
        for link in links {
            if !known.insert(link.short_code.clone()) {
                trace!(code = %link.short_code, "short code already stored, skipping");
                continue;
            }
            debug!(code = %link.short_code, url = %link.long_url, owner = %link.owner_id, "stored link");
            document.links.push(link.clone());
            inserted.push(link);
        }

        if !inserted.is_empty() {
            self.commit(ctx, &document).await?;
        }

        Ok(inserted)
    }

    async fn find_by_short_code(&self, ctx: &Context, code: &ShortCode) -> Result<Link> {
        let document = self.read_document(ctx).await?;

        document
            .links
            .into_iter()
            .find(|link| &link.short_code == code)
            .ok_or_else(|| StorageError::NotFound(code.to_string()))
    }

    async fn select_by_owner(&self, ctx: &Context, owner: &UserId) -> Result<Vec<Link>> {
        let document = self.read_document(ctx).await?;

        Ok(document
            .links
            .into_iter()
            .filter(|link| &link.owner_id == owner)
            .collect())
    }

    async fn mark_deleted(&self, ctx: &Context, links: &[Link]) -> Result<u64> {
        let _guard = ctx.run(self.lock.write()).await?;
        let mut document = ctx.run(self.load()).await??;

        let targets: HashSet<&ShortCode> = links.iter().map(|link| &link.short_code).collect();
        let mut changed = 0;
        for stored in document.links.iter_mut() {
            if !stored.is_deleted && targets.contains(&stored.short_code) {
                stored.is_deleted = true;
                changed += 1;
            }
        }

        if changed > 0 {
            self.commit(ctx, &document).await?;
        }

        debug!(requested = links.len(), changed, "marked links as deleted");
        Ok(changed)
    }

    async fn ensure_user(&self, ctx: &Context, id: &UserId) -> Result<User> {
        let _guard = ctx.run(self.lock.write()).await?;
        let mut document = ctx.run(self.load()).await??;

        if let Some(user) = document.users.get(id) {
            return Ok(user.clone());
        }

        let user = User::new(id.clone());
        document.users.insert(id.clone(), user.clone());
        self.commit(ctx, &document).await?;

        debug!(user = %id, "recorded new user");
        Ok(user)
    }

    async fn health_check(&self, ctx: &Context) -> Result<()> {
        let _guard = ctx.run(self.lock.read()).await?;

        ctx.run(tokio::fs::metadata(&self.path))
            .await?
            .map(|_| ())
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", self.path.display())))
    }

    async fn stats(&self, ctx: &Context) -> Result<Stats> {
        let document = self.read_document(ctx).await?;

        let urls = document.links.iter().filter(|link| !link.is_deleted).count();
        Ok(Stats {
            urls: urls as u64,
            users: document.users.len() as u64,
        })
    }
}
