use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::{Row, error::SqlState};
use uuid::Uuid;

use crate::{
    crypto::password::PasswordDigest,
    error::{AuthError, Result},
    models::user::{NewUser, UserRecord},
};

/// The credential store. Email uniqueness is enforced here.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Looks a user up by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRecord>>;

    /// Inserts a new user, failing with `DuplicateEmail` if the email is taken.
    async fn insert(&self, user: NewUser) -> Result<UserRecord>;

    /// Replaces a user's password digest.
    async fn update_password(&self, user_id: Uuid, digest: &PasswordDigest) -> Result<()>;
}

const USER_COLUMNS: &str = "id, email, display_name, password_hash, created_at";

/// A helper function to map a `tokio_postgres::Row` to a `UserRecord`.
fn row_to_user(row: &Row) -> Result<UserRecord> {
    let column = |name: &str| AuthError::Internal(format!("Missing column: {}", name));
    Ok(UserRecord {
        id: row.try_get("id").map_err(|_| column("id"))?,
        email: row.try_get("email").map_err(|_| column("email"))?,
        display_name: row.try_get("display_name").map_err(|_| column("display_name"))?,
        password_hash: PasswordDigest::from_stored(
            row.try_get("password_hash").map_err(|_| column("password_hash"))?,
        ),
        created_at: row.try_get("created_at").map_err(|_| column("created_at"))?,
    })
}

/// PostgreSQL-backed credential store.
#[derive(Clone)]
pub struct PgUserStore {
    pool: Pool,
}

impl PgUserStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Creates the `users` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id UUID PRIMARY KEY,
                    email TEXT NOT NULL UNIQUE,
                    display_name TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#,
            )
            .await?;
        tracing::info!("✅ users table ready");
        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .await?;
        let row = client.query_opt(&statement, &[&email]).await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRecord>> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .await?;
        let row = client.query_opt(&statement, &[&user_id]).await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached(&format!(
                r#"
                INSERT INTO users (id, email, display_name, password_hash, created_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {}
                "#,
                USER_COLUMNS
            ))
            .await?;

        let row = client
            .query_one(
                &statement,
                &[
                    &user.id,
                    &user.email,
                    &user.display_name,
                    &user.password_hash.as_str(),
                    &user.created_at,
                ],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    AuthError::DuplicateEmail
                } else {
                    AuthError::from(e)
                }
            })?;

        row_to_user(&row)
    }

    async fn update_password(&self, user_id: Uuid, digest: &PasswordDigest) -> Result<()> {
        let client = self.pool.get().await?;
        let statement = client
            .prepare_cached("UPDATE users SET password_hash = $1 WHERE id = $2")
            .await?;
        client
            .execute(&statement, &[&digest.as_str(), &user_id])
            .await?;
        Ok(())
    }
}
