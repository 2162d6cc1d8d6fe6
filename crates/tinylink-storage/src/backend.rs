use crate::file::FileRepository;
use crate::memory::InMemoryRepository;
use crate::postgres::PostgresRepository;
use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use tinylink_core::repository::{LinkRepository, Result, Stats};
use tinylink_core::{Context, Link, ShortCode, User, UserId};
use tracing::info;
use typed_builder::TypedBuilder;

/// Inputs of the start-up backend decision.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct StorageConfig {
    /// Postgres connection string. Takes precedence over everything else.
    #[builder(default, setter(into, strip_option))]
    pub database_dsn: Option<String>,
    /// JSON document used when no database is configured.
    #[builder(default, setter(into, strip_option))]
    pub file_path: Option<PathBuf>,
}

/// Which kind of backend a [`Backend`] wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    InMemory,
    File,
    Postgres,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::InMemory => write!(f, "in-memory"),
            BackendKind::File => write!(f, "file"),
            BackendKind::Postgres => write!(f, "postgres"),
        }
    }
}

impl StorageConfig {
    /// A connection string wins over a file path, which wins over memory.
    /// A blank connection string or empty path counts as absent.
    pub fn kind(&self) -> BackendKind {
        let present = |value: Option<&str>| value.is_some_and(|v| !v.trim().is_empty());

        if present(self.database_dsn.as_deref()) {
            BackendKind::Postgres
        } else if self
            .file_path
            .as_ref()
            .is_some_and(|path| !path.as_os_str().is_empty())
        {
            BackendKind::File
        } else {
            BackendKind::InMemory
        }
    }
}

/// The closed set of storage backends, selected once at start-up.
#[derive(Debug, Clone)]
pub enum Backend {
    InMemory(InMemoryRepository),
    File(FileRepository),
    Postgres(PostgresRepository),
}

impl Backend {
    /// Opens the backend `config` selects. Postgres gets its schema applied.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let kind = config.kind();
        info!(backend = %kind, "opening storage backend");

        let backend = match (kind, &config.database_dsn, &config.file_path) {
            (BackendKind::Postgres, Some(dsn), _) => {
                let repository = PostgresRepository::connect(dsn).await?;
                repository.migrate().await?;
                Backend::Postgres(repository)
            }
            (BackendKind::File, _, Some(path)) => Backend::File(FileRepository::open(path).await?),
            _ => Backend::InMemory(InMemoryRepository::new()),
        };

        Ok(backend)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::InMemory(_) => BackendKind::InMemory,
            Backend::File(_) => BackendKind::File,
            Backend::Postgres(_) => BackendKind::Postgres,
        }
    }

    fn repository(&self) -> &dyn LinkRepository {
        match self {
            Backend::InMemory(repository) => repository,
            Backend::File(repository) => repository,
            Backend::Postgres(repository) => repository,
        }
    }
}

impl From<InMemoryRepository> for Backend {
    fn from(value: InMemoryRepository) -> Self {
        Backend::InMemory(value)
    }
}

impl From<FileRepository> for Backend {
    fn from(value: FileRepository) -> Self {
        Backend::File(value)
    }
}

impl From<PostgresRepository> for Backend {
    fn from(value: PostgresRepository) -> Self {
        Backend::Postgres(value)
    }
}

#[async_trait]
impl LinkRepository for Backend {
    async fn batch_insert(&self, ctx: &Context, links: Vec<Link>) -> Result<Vec<Link>> {
        self.repository().batch_insert(ctx, links).await
    }

    async fn find_by_short_code(&self, ctx: &Context, code: &ShortCode) -> Result<Link> {
        self.repository().find_by_short_code(ctx, code).await
    }

    async fn select_by_owner(&self, ctx: &Context, owner: &UserId) -> Result<Vec<Link>> {
        self.repository().select_by_owner(ctx, owner).await
    }

    async fn mark_deleted(&self, ctx: &Context, links: &[Link]) -> Result<u64> {
        self.repository().mark_deleted(ctx, links).await
    }

    async fn ensure_user(&self, ctx: &Context, id: &UserId) -> Result<User> {
        self.repository().ensure_user(ctx, id).await
    }

    async fn health_check(&self, ctx: &Context) -> Result<()> {
        self.repository().health_check(ctx).await
    }

    async fn stats(&self, ctx: &Context) -> Result<Stats> {
        self.repository().stats(ctx).await
    }
}
