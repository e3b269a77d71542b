use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    clock::Clock,
    crypto::random::generate_session_id,
    error::Result,
    models::session::Session,
    repositories::{session::SessionStore, timeout::bounded},
};

/// Server-side session lifecycle.
///
/// A session is `Active` from `create` until either `expires_at` passes or
/// `destroy` is called; both end states are final. Expired sessions are
/// purged lazily the next time they are looked up.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    sliding: bool,
    store_timeout: StdDuration,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        sliding: bool,
        store_timeout: StdDuration,
    ) -> Self {
        Self {
            store,
            clock,
            ttl,
            sliding,
            store_timeout,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Starts a session for `user_id` and persists it in one write.
    pub async fn create(&self, user_id: Uuid) -> Result<Session> {
        let now = self.clock.now();
        let session = Session {
            id: generate_session_id(),
            user_id,
            data: HashMap::new(),
            created_at: now,
            expires_at: now + self.ttl,
        };

        bounded(self.store_timeout, "session save", self.store.save(&session, now)).await?;
        tracing::info!("✅ Session created for user: {}", user_id);
        Ok(session)
    }

    /// Returns the session if it exists and has not expired.
    pub async fn load(&self, session_id: &str) -> Result<Option<Session>> {
        let Some(session) =
            bounded(self.store_timeout, "session load", self.store.load(session_id)).await?
        else {
            return Ok(None);
        };

        if session.is_expired_at(self.clock.now()) {
            tracing::debug!("Session expired for user: {}", session.user_id);
            bounded(self.store_timeout, "session delete", self.store.delete(session_id)).await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Records activity on a session.
    ///
    /// With sliding expiration on, `expires_at` moves to now + TTL. With it
    /// off, the session is returned unchanged.
    pub async fn touch(&self, session_id: &str) -> Result<Option<Session>> {
        let Some(mut session) = self.load(session_id).await? else {
            return Ok(None);
        };

        if self.sliding {
            let now = self.clock.now();
            session.expires_at = now + self.ttl;
            bounded(self.store_timeout, "session save", self.store.save(&session, now)).await?;
        }

        Ok(Some(session))
    }

    /// Persists changes a handler made to `session.data`. Last write wins.
    ///
    /// Returns `None` if the session is no longer active; a destroyed or
    /// expired session is never resurrected.
    pub async fn update(&self, session: &Session) -> Result<Option<Session>> {
        let Some(current) = self.load(&session.id).await? else {
            return Ok(None);
        };

        let updated = Session {
            data: session.data.clone(),
            ..current
        };
        let now = self.clock.now();
        bounded(self.store_timeout, "session save", self.store.save(&updated, now)).await?;
        Ok(Some(updated))
    }

    /// Sets one value in the session's data.
    pub async fn set_value(
        &self,
        session_id: &str,
        key: &str,
        value: sonic_rs::Value,
    ) -> Result<Option<Session>> {
        let Some(mut session) = self.load(session_id).await? else {
            return Ok(None);
        };
        session.insert(key, value);
        self.update(&session).await
    }

    /// Ends a session. Destroying an absent session is a no-op.
    pub async fn destroy(&self, session_id: &str) -> Result<()> {
        bounded(self.store_timeout, "session delete", self.store.delete(session_id)).await?;
        tracing::debug!("Session destroyed");
        Ok(())
    }

    /// Ends every session of a user.
    pub async fn destroy_all_for_user(&self, user_id: Uuid) -> Result<usize> {
        let removed = bounded(
            self.store_timeout,
            "session delete_for_user",
            self.store.delete_for_user(user_id),
        )
        .await?;
        tracing::info!("🧹 Destroyed {} sessions for user: {}", removed, user_id);
        Ok(removed)
    }

    /// Removes expired sessions from the store.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        bounded(self.store_timeout, "session purge", self.store.purge_expired(now)).await
    }

    /// Runs `sweep_expired` every `period` until the handle is aborted.
    pub fn spawn_sweeper(&self, period: StdDuration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                tracing::info!("🧹 Running scheduled sweep of expired sessions...");
                match manager.sweep_expired().await {
                    Ok(removed) => {
                        tracing::info!("✅ Session sweep completed, removed {}", removed);
                    }
                    Err(e) => {
                        tracing::error!("❌ Session sweep failed: {}", e);
                    }
                }
            }
        })
    }
}
