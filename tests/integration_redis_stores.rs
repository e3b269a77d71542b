//! Runs against a live Redis when `REDIS_URL` is set, e.g.
//! `REDIS_URL=redis://127.0.0.1:6380/ cargo test --test integration_redis_stores`.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use gatekeep::{
    RefreshRegistry, Session, SessionStore,
    db::connect_redis,
    models::token::RefreshEntry,
    repositories::{refresh::RedisRefreshRegistry, session::RedisSessionStore},
};
use redis::aio::ConnectionManager;
use uuid::Uuid;

async fn redis() -> Option<ConnectionManager> {
    let Ok(url) = std::env::var("REDIS_URL") else {
        eprintln!("REDIS_URL not set; skipping Redis store tests");
        return None;
    };
    Some(connect_redis(&url).await.unwrap())
}

async fn ttl(redis: &ConnectionManager, key: &str) -> i64 {
    let mut conn = redis.clone();
    redis::cmd("TTL").arg(key).query_async(&mut conn).await.unwrap()
}

fn session(user_id: Uuid, lifetime: Duration) -> Session {
    let now = Utc::now();
    Session {
        id: Uuid::new_v4().to_string(),
        user_id,
        data: HashMap::new(),
        created_at: now,
        expires_at: now + lifetime,
    }
}

#[tokio::test]
async fn session_index_outlives_every_listed_session() {
    let Some(redis) = redis().await else { return };
    let store = RedisSessionStore::new(redis.clone());
    let user = Uuid::new_v4();
    let t0 = Utc::now();

    let a = session(user, Duration::minutes(60));
    let b = session(user, Duration::minutes(90));
    store.save(&a, t0).await.unwrap();
    store.save(&b, t0).await.unwrap();

    // Re-saving A later with its original deadline must not shorten the index.
    store.save(&a, t0 + Duration::minutes(40)).await.unwrap();

    let index_ttl = ttl(&redis, &format!("user_sessions:{}", user)).await;
    assert!(index_ttl > 60 * 60, "index TTL dropped to {}", index_ttl);

    assert_eq!(store.delete_for_user(user).await.unwrap(), 2);
}

#[tokio::test]
async fn refresh_index_outlives_every_listed_token() {
    let Some(redis) = redis().await else { return };
    let registry = RedisRefreshRegistry::new(redis.clone());
    let user = Uuid::new_v4();
    let now = Utc::now();
    let entry = |lifetime: Duration| RefreshEntry {
        jti: Uuid::new_v4().simple().to_string(),
        user_id: user,
        expires_at: now + lifetime,
    };

    registry.register(&entry(Duration::days(7)), now).await.unwrap();
    registry.register(&entry(Duration::hours(1)), now).await.unwrap();

    let index_ttl = ttl(&redis, &format!("user_refresh:{}", user)).await;
    assert!(index_ttl > 6 * 86400, "index TTL dropped to {}", index_ttl);

    assert_eq!(registry.revoke_all_for_user(user).await.unwrap(), 2);
}

#[tokio::test]
async fn rotation_is_all_or_nothing() {
    let Some(redis) = redis().await else { return };
    let registry = RedisRefreshRegistry::new(redis);
    let user = Uuid::new_v4();
    let now = Utc::now();
    let entry = |jti: &str| RefreshEntry {
        jti: format!("{}-{}", user, jti),
        user_id: user,
        expires_at: now + Duration::days(1),
    };

    let old = entry("old");
    let next = entry("next");
    registry.register(&old, now).await.unwrap();

    let consumed = registry.rotate(&old.jti, &next, now).await.unwrap();
    assert_eq!(consumed, Some(old.clone()));

    let replayed = entry("replayed");
    assert_eq!(registry.rotate(&old.jti, &replayed, now).await.unwrap(), None);
    assert!(registry.consume(&replayed.jti).await.unwrap().is_none());

    assert_eq!(registry.revoke_all_for_user(user).await.unwrap(), 1);
}
