use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use uuid::Uuid;

use crate::{
    error::{AuthError, Result},
    models::token::RefreshEntry,
    repositories::indexed::{extend_index_lua, save_indexed, ttl_secs},
};

/// Persisted refresh tokens, keyed by token ID, used for revocation and
/// rotation-on-use.
#[async_trait]
pub trait RefreshRegistry: Send + Sync {
    async fn register(&self, entry: &RefreshEntry, now: DateTime<Utc>) -> Result<()>;

    /// Atomically removes and returns the entry. `None` means the token was
    /// already redeemed, revoked, or never registered.
    async fn consume(&self, jti: &str) -> Result<Option<RefreshEntry>>;

    /// Atomically consumes `old_jti` and registers `next` in its place.
    ///
    /// Returns the consumed entry. On `None` nothing changed: `old_jti` was
    /// not outstanding and `next` is not registered. `next` may carry the
    /// same `jti` as the consumed token.
    async fn rotate(
        &self,
        old_jti: &str,
        next: &RefreshEntry,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshEntry>>;

    /// Revokes one token. Revoking an unknown token is not an error.
    async fn revoke(&self, jti: &str) -> Result<()>;

    /// Revokes every outstanding token of a user, returning how many were removed.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<usize>;
}

fn refresh_key(jti: &str) -> String {
    format!("refresh:{}", jti)
}

fn user_refresh_key(user_id: Uuid) -> String {
    format!("user_refresh:{}", user_id)
}

fn entry_to_json(entry: &RefreshEntry) -> Result<String> {
    sonic_rs::to_string(entry)
        .map_err(|e| AuthError::Internal(format!("Refresh entry serialization failed: {}", e)))
}

fn entry_from_json(json: &str) -> Option<RefreshEntry> {
    match sonic_rs::from_str(json) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!("❌ Invalid refresh entry JSON, treating as absent: {}", e);
            None
        }
    }
}

// KEYS: old record, next record, user index.
// ARGV: old jti, next value, ttl seconds, next jti.
static ROTATE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(&format!(
        "local consumed = redis.call('GET', KEYS[1])\n\
         if not consumed then\n\
           return false\n\
         end\n\
         redis.call('DEL', KEYS[1])\n\
         redis.call('SREM', KEYS[3], ARGV[1])\n\
         redis.call('SET', KEYS[2], ARGV[2], 'EX', ARGV[3])\n\
         redis.call('SADD', KEYS[3], ARGV[4])\n\
         {}\
         return consumed",
        extend_index_lua(3, 3)
    ))
});

/// Redis-backed refresh registry.
///
/// The `user_refresh:{uid}` index lives as long as its longest-lived token.
#[derive(Clone)]
pub struct RedisRefreshRegistry {
    redis: ConnectionManager,
}

impl RedisRefreshRegistry {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RefreshRegistry for RedisRefreshRegistry {
    async fn register(&self, entry: &RefreshEntry, now: DateTime<Utc>) -> Result<()> {
        save_indexed(
            &self.redis,
            &refresh_key(&entry.jti),
            &entry_to_json(entry)?,
            &user_refresh_key(entry.user_id),
            &entry.jti,
            ttl_secs(entry.expires_at, now),
        )
        .await?;

        tracing::debug!("✅ Refresh token registered: refresh:{}", entry.jti);
        Ok(())
    }

    async fn consume(&self, jti: &str) -> Result<Option<RefreshEntry>> {
        let mut redis = self.redis.clone();
        let entry_json: Option<String> = redis.get_del(refresh_key(jti)).await?;

        let Some(entry) = entry_json.as_deref().and_then(entry_from_json) else {
            return Ok(None);
        };

        let _: i64 = redis.srem(user_refresh_key(entry.user_id), jti).await?;
        Ok(Some(entry))
    }

    async fn rotate(
        &self,
        old_jti: &str,
        next: &RefreshEntry,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshEntry>> {
        let mut redis = self.redis.clone();
        let consumed: Option<String> = ROTATE
            .key(refresh_key(old_jti))
            .key(refresh_key(&next.jti))
            .key(user_refresh_key(next.user_id))
            .arg(old_jti)
            .arg(entry_to_json(next)?)
            .arg(ttl_secs(next.expires_at, now))
            .arg(&next.jti)
            .invoke_async(&mut redis)
            .await?;

        tracing::debug!("🔄 Refresh token rotated: refresh:{}", old_jti);
        Ok(consumed.as_deref().and_then(entry_from_json))
    }

    async fn revoke(&self, jti: &str) -> Result<()> {
        self.consume(jti).await.map(|_| ())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<usize> {
        let mut redis = self.redis.clone();
        let index_key = user_refresh_key(user_id);
        let token_ids: Vec<String> = redis.smembers(&index_key).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for jti in &token_ids {
            pipe.del(refresh_key(jti));
        }
        pipe.del(&index_key).ignore();
        let removed: Vec<i64> = pipe.query_async(&mut redis).await?;

        Ok(removed.into_iter().filter(|n| *n > 0).count())
    }
}
