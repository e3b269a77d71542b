use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, aio::ConnectionManager};
use uuid::Uuid;

use crate::{
    error::Result,
    models::session::Session,
    repositories::indexed::{save_indexed, ttl_secs},
};

/// Backing store for server-side sessions.
///
/// `save` is a single atomic write: a session is either fully persisted or
/// not at all. Per-user indexes never expire before a record they list.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts or overwrites the session (last write wins).
    async fn save(&self, session: &Session, now: DateTime<Utc>) -> Result<()>;

    async fn load(&self, session_id: &str) -> Result<Option<Session>>;

    /// Removes the session. Removing an absent session is not an error.
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Removes every session of a user, returning how many were removed.
    async fn delete_for_user(&self, user_id: Uuid) -> Result<usize>;

    /// Drops sessions expired at `now`. Stores with native expiry may return 0.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

fn user_sessions_key(user_id: Uuid) -> String {
    format!("user_sessions:{}", user_id)
}

/// Redis-backed session store. Keys expire natively at `expires_at`; the
/// `user_sessions:{uid}` index lives as long as its longest-lived session.
#[derive(Clone)]
pub struct RedisSessionStore {
    redis: ConnectionManager,
}

impl RedisSessionStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn save(&self, session: &Session, now: DateTime<Utc>) -> Result<()> {
        let session_json = sonic_rs::to_string(session).map_err(|e| {
            crate::error::AuthError::Internal(format!("Session serialization failed: {}", e))
        })?;

        save_indexed(
            &self.redis,
            &session_key(&session.id),
            &session_json,
            &user_sessions_key(session.user_id),
            &session.id,
            ttl_secs(session.expires_at, now),
        )
        .await?;

        tracing::debug!("✅ Session saved to Redis: session:{}", session.id);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Session>> {
        let mut redis = self.redis.clone();
        let session_json: Option<String> = redis.get(session_key(session_id)).await?;

        Ok(session_json.and_then(|json| match sonic_rs::from_str::<Session>(&json) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("❌ Invalid session JSON, treating as absent: {}", e);
                None
            }
        }))
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: i64 = redis.del(session_key(session_id)).await?;
        Ok(())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<usize> {
        let mut redis = self.redis.clone();
        let index_key = user_sessions_key(user_id);
        let session_ids: Vec<String> = redis.smembers(&index_key).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for session_id in &session_ids {
            pipe.del(session_key(session_id));
        }
        pipe.del(&index_key).ignore();
        let removed: Vec<i64> = pipe.query_async(&mut redis).await?;

        Ok(removed.into_iter().filter(|n| *n > 0).count())
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }
}
