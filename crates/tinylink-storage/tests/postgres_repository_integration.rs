mod common;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tinylink_core::{Context, LinkRepository, ShortCode};
use tinylink_storage::PostgresRepository;
use tinylink_test_infra::postgres::{PostgresConfig, PostgresServer};

struct Fixture {
    _postgres: PostgresServer,
    repo: PostgresRepository,
}

impl Fixture {
    async fn start() -> Self {
        let postgres = PostgresServer::new(PostgresConfig::builder().build())
            .await
            .expect("start postgres");
        let url = postgres.database_url().await.expect("postgres url");
        let pool = connect_with_retry(&url).await;

        let repo = PostgresRepository::new(pool);
        repo.migrate().await.expect("create schema");

        Self {
            _postgres: postgres,
            repo,
        }
    }
}

async fn connect_with_retry(url: &str) -> sqlx::PgPool {
    let mut last_error = None;

    for _ in 0..20 {
        match PgPoolOptions::new().max_connections(5).connect(url).await {
            Ok(pool) => return pool,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect postgres: {last_error:?}");
}

macro_rules! postgres_contract {
    ($($case:ident),* $(,)?) => {
        $(
            #[tokio::test]
            #[ignore = "requires docker"]
            async fn $case() {
                let fixture = Fixture::start().await;
                common::$case(&fixture.repo).await;
            }
        )*
    };
}

postgres_contract!(
    insert_and_find,
    unknown_code_is_not_found,
    batch_skips_existing_codes,
    duplicates_within_batch_insert_once,
    select_by_owner_includes_deleted,
    mark_deleted_is_monotonic,
    ensure_user_is_idempotent,
    stats_count_live_links,
    cancelled_context_is_reported,
    health_check_passes,
);

#[tokio::test]
#[ignore = "requires docker"]
async fn migrate_is_idempotent() {
    let fixture = Fixture::start().await;
    fixture.repo.migrate().await.unwrap();
    fixture.repo.migrate().await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn failed_batch_rolls_back_entirely() {
    let fixture = Fixture::start().await;
    let ctx = Context::background();

    let good = common::link("http://a.com", "user-a");
    let mut clash = common::link("http://b.com", "user-a");
    // Same primary key as `good`: the whole statement fails.
    clash.id = good.id;

    let err = fixture.repo.batch_insert(&ctx, vec![good, clash]).await;
    assert!(err.is_err());

    let stats = fixture.repo.stats(&ctx).await.unwrap();
    assert_eq!(stats.urls, 0);
    assert!(fixture
        .repo
        .find_by_short_code(&ctx, &ShortCode::from_url("http://a.com"))
        .await
        .is_err());
}
