//! Behaviour every backend must share, run against each implementation.

use tinylink_core::{Context, ContextError, Link, LinkRepository, ShortCode, StorageError, UserId};

pub fn link(url: &str, owner: &str) -> Link {
    Link::new(url, UserId::new(owner))
}

pub async fn insert_and_find<R: LinkRepository>(repo: &R) {
    let ctx = Context::background();
    let original = link("http://ya.ru", "user-a");

    let inserted = repo.batch_insert(&ctx, vec![original.clone()]).await.unwrap();
    assert_eq!(inserted, vec![original.clone()]);

    let found = repo
        .find_by_short_code(&ctx, &ShortCode::from_url("http://ya.ru"))
        .await
        .unwrap();
    assert_eq!(found, original);
}

pub async fn unknown_code_is_not_found<R: LinkRepository>(repo: &R) {
    let err = repo
        .find_by_short_code(&Context::background(), &ShortCode::from_url("http://nowhere"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

pub async fn batch_skips_existing_codes<R: LinkRepository>(repo: &R) {
    let ctx = Context::background();
    let first = link("http://a.com", "user-a");
    repo.batch_insert(&ctx, vec![first.clone()]).await.unwrap();

    let b = link("http://b.com", "user-b");
    let inserted = repo
        .batch_insert(&ctx, vec![link("http://a.com", "user-b"), b.clone()])
        .await
        .unwrap();
    assert_eq!(inserted, vec![b]);

    let stored = repo.find_by_short_code(&ctx, &first.short_code).await.unwrap();
    assert_eq!(stored.owner_id, UserId::new("user-a"));
    assert_eq!(stored.id, first.id);
}

pub async fn duplicates_within_batch_insert_once<R: LinkRepository>(repo: &R) {
    let ctx = Context::background();
    let a = link("http://a.com", "user-a");
    let b = link("http://b.com", "user-a");
    let again = link("http://a.com", "user-a");

    let inserted = repo
        .batch_insert(&ctx, vec![a.clone(), b.clone(), again])
        .await
        .unwrap();

    assert_eq!(inserted, vec![a, b]);
}

pub async fn select_by_owner_includes_deleted<R: LinkRepository>(repo: &R) {
    let ctx = Context::background();
    let a = link("http://a.com", "user-a");
    let b = link("http://b.com", "user-a");
    let other = link("http://c.com", "user-b");
    repo.batch_insert(&ctx, vec![a.clone(), b.clone(), other])
        .await
        .unwrap();

    assert_eq!(repo.mark_deleted(&ctx, &[a.clone()]).await.unwrap(), 1);

    let owned = repo.select_by_owner(&ctx, &UserId::new("user-a")).await.unwrap();
    assert_eq!(owned.len(), 2);
    let deleted: Vec<bool> = owned.iter().map(|l| l.is_deleted).collect();
    assert!(deleted.contains(&true));
    assert!(deleted.contains(&false));

    let none = repo.select_by_owner(&ctx, &UserId::new("nobody")).await.unwrap();
    assert!(none.is_empty());
}

pub async fn mark_deleted_is_monotonic<R: LinkRepository>(repo: &R) {
    let ctx = Context::background();
    let a = link("http://a.com", "user-a");
    repo.batch_insert(&ctx, vec![a.clone()]).await.unwrap();

    assert_eq!(repo.mark_deleted(&ctx, &[a.clone()]).await.unwrap(), 1);
    assert_eq!(repo.mark_deleted(&ctx, &[a.clone()]).await.unwrap(), 0);

    let stored = repo.find_by_short_code(&ctx, &a.short_code).await.unwrap();
    assert!(stored.is_deleted);

    // A deleted code still blocks re-insertion.
    let inserted = repo
        .batch_insert(&ctx, vec![link("http://a.com", "user-b")])
        .await
        .unwrap();
    assert!(inserted.is_empty());
}

pub async fn ensure_user_is_idempotent<R: LinkRepository>(repo: &R) {
    let ctx = Context::background();
    let id = UserId::new("user-a");

    let first = repo.ensure_user(&ctx, &id).await.unwrap();
    let second = repo.ensure_user(&ctx, &id).await.unwrap();

    assert_eq!(first.id, id);
    assert_eq!(first.created_at.as_second(), second.created_at.as_second());
    assert_eq!(repo.stats(&ctx).await.unwrap().users, 1);
}

pub async fn stats_count_live_links<R: LinkRepository>(repo: &R) {
    let ctx = Context::background();
    let a = link("http://a.com", "user-a");
    repo.ensure_user(&ctx, &UserId::new("user-a")).await.unwrap();
    repo.ensure_user(&ctx, &UserId::new("user-b")).await.unwrap();
    repo.batch_insert(&ctx, vec![a.clone(), link("http://b.com", "user-b")])
        .await
        .unwrap();
    repo.mark_deleted(&ctx, &[a]).await.unwrap();

    let stats = repo.stats(&ctx).await.unwrap();
    assert_eq!(stats.urls, 1);
    assert_eq!(stats.users, 2);
}

pub async fn cancelled_context_is_reported<R: LinkRepository>(repo: &R) {
    let (ctx, handle) = Context::with_cancel();
    handle.cancel();

    let err = repo
        .batch_insert(&ctx, vec![link("http://a.com", "user-a")])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Cancelled(ContextError::Cancelled)));

    let live = Context::background();
    let missing = repo
        .find_by_short_code(&live, &ShortCode::from_url("http://a.com"))
        .await
        .unwrap_err();
    assert!(matches!(missing, StorageError::NotFound(_)));
}

pub async fn health_check_passes<R: LinkRepository>(repo: &R) {
    repo.health_check(&Context::background()).await.unwrap();
}
