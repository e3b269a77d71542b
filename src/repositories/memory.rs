//! In-process store adapters.
//!
//! Useful for tests and single-node hosts. They honour the same contracts as
//! the Redis and PostgreSQL adapters, including email uniqueness and atomic
//! refresh-token consumption.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    crypto::password::PasswordDigest,
    error::{AuthError, Result},
    models::{
        session::Session,
        token::RefreshEntry,
        user::{NewUser, UserRecord},
    },
    repositories::{refresh::RefreshRegistry, session::SessionStore, user::UserStore},
};

#[derive(Default)]
struct Users {
    by_id: HashMap<Uuid, UserRecord>,
    id_by_email: HashMap<String, Uuid>,
}

/// A credential store held in memory.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    inner: Arc<RwLock<Users>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let users = self.inner.read().await;
        Ok(users
            .id_by_email
            .get(email)
            .and_then(|id| users.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.inner.read().await.by_id.get(&user_id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord> {
        let mut users = self.inner.write().await;
        if users.id_by_email.contains_key(&user.email) {
            return Err(AuthError::DuplicateEmail);
        }
        let record = user.into_record();
        users.id_by_email.insert(record.email.clone(), record.id);
        users.by_id.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_password(&self, user_id: Uuid, digest: &PasswordDigest) -> Result<()> {
        let mut users = self.inner.write().await;
        if let Some(user) = users.by_id.get_mut(&user_id) {
            user.password_hash = digest.clone();
        }
        Ok(())
    }
}

/// A session store held in memory. Expired entries stay until purged or loaded.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, session: &Session, _now: DateTime<Utc>) -> Result<()> {
        self.inner
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.inner.read().await.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.inner.write().await.remove(session_id);
        Ok(())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<usize> {
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.user_id != user_id);
        Ok(before - sessions.len())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        Ok(before - sessions.len())
    }
}

/// A refresh registry held in memory.
#[derive(Clone, Default)]
pub struct MemoryRefreshRegistry {
    inner: Arc<RwLock<HashMap<String, RefreshEntry>>>,
}

impl MemoryRefreshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding tokens for a user.
    pub async fn outstanding_for(&self, user_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|entry| entry.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl RefreshRegistry for MemoryRefreshRegistry {
    async fn register(&self, entry: &RefreshEntry, _now: DateTime<Utc>) -> Result<()> {
        self.inner
            .write()
            .await
            .insert(entry.jti.clone(), entry.clone());
        Ok(())
    }

    async fn consume(&self, jti: &str) -> Result<Option<RefreshEntry>> {
        Ok(self.inner.write().await.remove(jti))
    }

    async fn rotate(
        &self,
        old_jti: &str,
        next: &RefreshEntry,
        _now: DateTime<Utc>,
    ) -> Result<Option<RefreshEntry>> {
        let mut entries = self.inner.write().await;
        let Some(consumed) = entries.remove(old_jti) else {
            return Ok(None);
        };
        entries.insert(next.jti.clone(), next.clone());
        Ok(Some(consumed))
    }

    async fn revoke(&self, jti: &str) -> Result<()> {
        self.inner.write().await.remove(jti);
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<usize> {
        let mut entries = self.inner.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.user_id != user_id);
        Ok(before - entries.len())
    }
}
