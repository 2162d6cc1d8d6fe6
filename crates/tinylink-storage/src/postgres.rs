use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::collections::HashSet;
use tinylink_core::repository::{LinkRepository, Result, Stats};
use tinylink_core::{Context, Link, LinkId, ShortCode, StorageError, User, UserId};
use tracing::{debug, info};
use uuid::Uuid;

/// DDL applied by [`PostgresRepository::migrate`].
pub const SCHEMA: &str = include_str!("../ddl/postgres/links.sql");

/// Rows per `INSERT` statement; five binds per row keeps this well under
/// the protocol's 65535 parameter limit.
const MAX_ROWS_PER_STATEMENT: usize = 1_000;

const LINK_COLUMNS: &str = "id, short_code, long_url, owner_id, is_deleted";

/// Postgres implementation of the repository contract.
///
/// A batch insert runs in one transaction using
/// `INSERT .. ON CONFLICT (short_code) DO NOTHING RETURNING id`, so
/// conflict detection and insertion happen in the same statement. Unlike
/// the memory and file backends, a failing batch is rolled back as a
/// whole, and so is a batch whose context is cancelled before commit.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a repository from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a new connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        info!("postgres schema is up to date");
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn link_from_row(row: &PgRow) -> Result<Link> {
    let id: Uuid = row.try_get("id").map_err(map_sqlx_error)?;
    let short_code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
    let long_url: String = row.try_get("long_url").map_err(map_sqlx_error)?;
    let owner_id: String = row.try_get("owner_id").map_err(map_sqlx_error)?;
    let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;

    Ok(Link {
        id: LinkId::from_uuid(id),
        short_code: ShortCode::new_unchecked(short_code),
        long_url,
        owner_id: UserId::new(owner_id),
        is_deleted,
    })
}

fn parse_created_at(seconds: i64) -> Result<Timestamp> {
    Timestamp::from_second(seconds).map_err(|e| {
        StorageError::InvalidData(format!("invalid created_at timestamp '{}': {e}", seconds))
    })
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[async_trait]
impl LinkRepository for PostgresRepository {
    async fn batch_insert(&self, ctx: &Context, links: Vec<Link>) -> Result<Vec<Link>> {
        ctx.check()?;
        if links.is_empty() {
            return Ok(links);
        }

        // Dropping the transaction without commit rolls it back, which is
        // also what happens when the context wins a race below.
        let mut tx = ctx.run(self.pool.begin()).await?.map_err(map_sqlx_error)?;

        let mut inserted_ids: HashSet<Uuid> = HashSet::with_capacity(links.len());
        for chunk in links.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO links ({LINK_COLUMNS}) "));
            builder.push_values(chunk, |mut row, link| {
                row.push_bind(*link.id.as_uuid())
                    .push_bind(link.short_code.as_str())
                    .push_bind(link.long_url.as_str())
                    .push_bind(link.owner_id.as_str())
                    .push_bind(link.is_deleted);
            });
            builder.push(" ON CONFLICT (short_code) DO NOTHING RETURNING id");

            let rows = ctx
                .run(builder.build().fetch_all(&mut *tx))
                .await?
                .map_err(map_sqlx_error)?;
            for row in rows {
                inserted_ids.insert(row.try_get("id").map_err(map_sqlx_error)?);
            }
        }

        ctx.run(tx.commit()).await?.map_err(map_sqlx_error)?;

        let requested = links.len();
        let inserted: Vec<Link> = links
            .into_iter()
            .filter(|link| inserted_ids.contains(link.id.as_uuid()))
            .collect();
        debug!(requested, inserted = inserted.len(), "inserted link batch");

        Ok(inserted)
    }

    async fn find_by_short_code(&self, ctx: &Context, code: &ShortCode) -> Result<Link> {
        let query = format!("SELECT {LINK_COLUMNS} FROM links WHERE short_code = $1 LIMIT 1");
        let row = ctx
            .run(
                sqlx::query(&query)
                    .bind(code.as_str())
                    .fetch_optional(&self.pool),
            )
            .await?
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => link_from_row(&row),
            None => Err(StorageError::NotFound(code.to_string())),
        }
    }

    async fn select_by_owner(&self, ctx: &Context, owner: &UserId) -> Result<Vec<Link>> {
        let query = format!("SELECT {LINK_COLUMNS} FROM links WHERE owner_id = $1 ORDER BY id");
        let rows = ctx
            .run(sqlx::query(&query).bind(owner.as_str()).fetch_all(&self.pool))
            .await?
            .map_err(map_sqlx_error)?;

        rows.iter().map(link_from_row).collect()
    }

    async fn mark_deleted(&self, ctx: &Context, links: &[Link]) -> Result<u64> {
        ctx.check()?;
        if links.is_empty() {
            return Ok(0);
        }

        let codes: Vec<String> = links
            .iter()
            .map(|link| link.short_code.as_str().to_owned())
            .collect();

        let result = ctx
            .run(
                sqlx::query(
                    r#"
                    UPDATE links
                    SET is_deleted = TRUE
                    WHERE short_code = ANY($1)
                      AND is_deleted = FALSE
                    "#,
                )
                .bind(codes)
                .execute(&self.pool),
            )
            .await?
            .map_err(map_sqlx_error)?;

        debug!(requested = links.len(), changed = result.rows_affected(), "marked links as deleted");
        Ok(result.rows_affected())
    }

    async fn ensure_user(&self, ctx: &Context, id: &UserId) -> Result<User> {
        let mut tx = ctx.run(self.pool.begin()).await?.map_err(map_sqlx_error)?;

        ctx.run(
            sqlx::query(
                r#"
                INSERT INTO users (id, created_at)
                VALUES ($1, $2)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(id.as_str())
            .bind(Timestamp::now().as_second())
            .execute(&mut *tx),
        )
        .await?
        .map_err(map_sqlx_error)?;

        let row = ctx
            .run(
                sqlx::query("SELECT created_at FROM users WHERE id = $1")
                    .bind(id.as_str())
                    .fetch_one(&mut *tx),
            )
            .await?
            .map_err(map_sqlx_error)?;

        ctx.run(tx.commit()).await?.map_err(map_sqlx_error)?;

        let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
        Ok(User {
            id: id.clone(),
            created_at: parse_created_at(created_at)?,
        })
    }

    async fn health_check(&self, ctx: &Context) -> Result<()> {
        ctx.run(sqlx::query("SELECT 1").execute(&self.pool))
            .await?
            .map(|_| ())
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    async fn stats(&self, ctx: &Context) -> Result<Stats> {
        let row = ctx
            .run(
                sqlx::query(
                    r#"
                    SELECT
                        (SELECT COUNT(*) FROM links WHERE is_deleted = FALSE) AS urls,
                        (SELECT COUNT(*) FROM users) AS users
                    "#,
                )
                .fetch_one(&self.pool),
            )
            .await?
            .map_err(map_sqlx_error)?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let users: i64 = row.try_get("users").map_err(map_sqlx_error)?;
        Ok(Stats {
            urls: count(urls),
            users: count(users),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_a_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StorageError::Timeout(_)
        ));
    }

    #[test]
    fn closed_pool_is_unavailable() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            StorageError::Unavailable(_)
        ));
    }

    #[test]
    fn missing_row_is_invalid_data() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StorageError::InvalidData(_)
        ));
    }

    #[test]
    fn schema_declares_unique_short_code() {
        assert!(SCHEMA.contains("UNIQUE (short_code)"));
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS users"));
    }
}
