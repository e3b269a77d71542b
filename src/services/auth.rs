use std::sync::Arc;

use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    clock::{Clock, SystemClock},
    config::AuthConfig,
    crypto::{password::PasswordHasher, token::TokenIssuer},
    error::{AuthError, Result},
    models::{
        session::Session,
        token::{IssuedToken, RefreshEntry, TokenClass, TokenPair},
        user::{NewUser, PublicUser, UserRecord},
    },
    repositories::{
        memory::{MemoryRefreshRegistry, MemorySessionStore, MemoryUserStore},
        refresh::{RedisRefreshRegistry, RefreshRegistry},
        session::{RedisSessionStore, SessionStore},
        timeout::bounded,
        user::{PgUserStore, UserStore},
    },
    services::session::SessionManager,
    validation::auth::{
        ChangePasswordRequest, LoginRequest, RegisterRequest, normalize_email, validate_password,
        validate_registration,
    },
    web::{
        cookies::{ACCESS_COOKIE, CookieAction, REFRESH_COOKIE, SESSION_COOKIE},
        request::RequestView,
    },
};

/// The persistence handles the orchestrator works through. Owned by the host.
#[derive(Clone)]
pub struct AuthStores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub refresh_tokens: Arc<dyn RefreshRegistry>,
}

impl AuthStores {
    /// Everything in process memory.
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MemoryUserStore::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            refresh_tokens: Arc::new(MemoryRefreshRegistry::new()),
        }
    }

    /// Users in PostgreSQL, sessions and refresh tokens in Redis.
    pub fn postgres_redis(pool: Pool, redis: ConnectionManager) -> Self {
        Self {
            users: Arc::new(PgUserStore::new(pool)),
            sessions: Arc::new(RedisSessionStore::new(redis.clone())),
            refresh_tokens: Arc::new(RedisRefreshRegistry::new(redis)),
        }
    }
}

/// The result of a successful login.
#[derive(Debug)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub tokens: TokenPair,
    /// Present when session-based auth is enabled.
    pub session: Option<Session>,
    pub cookies: Vec<CookieAction>,
}

/// The result of a successful token refresh.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub tokens: TokenPair,
    pub cookies: Vec<CookieAction>,
}

/// The result of a logout. Always succeeds unless a store is down.
#[derive(Debug, Serialize)]
pub struct LogoutOutcome {
    pub message: String,
    #[serde(skip)]
    pub cookies: Vec<CookieAction>,
}

/// A credential found on a request, in the order they are tried.
#[derive(Debug, Clone, Copy)]
enum Credential<'a> {
    Bearer(&'a str),
    AccessCookie(&'a str),
    SessionCookie(&'a str),
}

impl Credential<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Credential::Bearer(_) => "bearer",
            Credential::AccessCookie(_) => "access cookie",
            Credential::SessionCookie(_) => "session cookie",
        }
    }
}

/// Collects the credentials carried by a request. Bearer comes first.
fn extract_credentials(request: &RequestView) -> Vec<Credential<'_>> {
    let mut credentials = Vec::with_capacity(3);
    if let Some(token) = request.bearer.as_deref().filter(|t| !t.is_empty()) {
        credentials.push(Credential::Bearer(token));
    }
    if let Some(token) = request.access_cookie() {
        credentials.push(Credential::AccessCookie(token));
    }
    if let Some(session_id) = request.session_id() {
        credentials.push(Credential::SessionCookie(session_id));
    }
    credentials
}

/// Composes hashing, sessions and tokens into the authentication flows.
#[derive(Clone)]
pub struct Authenticator {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshRegistry>,
    sessions: SessionManager,
    tokens: TokenIssuer,
    hasher: PasswordHasher,
    config: Arc<AuthConfig>,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    pub fn new(config: AuthConfig, stores: AuthStores) -> Self {
        Self::with_clock(config, stores, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AuthConfig, stores: AuthStores, clock: Arc<dyn Clock>) -> Self {
        let sessions = SessionManager::new(
            stores.sessions,
            clock.clone(),
            config.session_ttl,
            config.sliding_sessions,
            config.store_timeout,
        );
        let tokens = TokenIssuer::new(&config, clock.clone());
        let hasher = PasswordHasher::new(config.hasher.clone());

        tracing::info!(
            "✅ Authenticator initialized (sessions: {}, revocation: {}, rotation: {})",
            config.session_auth,
            config.refresh_revocation,
            config.refresh_rotation
        );

        Self {
            users: stores.users,
            refresh_tokens: stores.refresh_tokens,
            sessions,
            tokens,
            hasher,
            config: Arc::new(config),
            clock,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Creates a user account.
    ///
    /// # Returns
    ///
    /// The new user's public projection. `DuplicateEmail` if the normalized
    /// email is taken, `WeakPassword` if the password fails the policy.
    pub async fn register(&self, mut request: RegisterRequest) -> Result<PublicUser> {
        request.email = normalize_email(&request.email);
        request.display_name = request.display_name.trim().to_string();
        validate_registration(&request)?;

        if self.find_by_email(&request.email).await?.is_some() {
            tracing::debug!("Register rejected: email already present");
            return Err(AuthError::DuplicateEmail);
        }

        validate_password(&request.password, self.config.password_min_length)?;

        let password_hash = self.hasher.hash(&request.password).await?;
        let new_user = NewUser {
            id: Uuid::new_v4(),
            email: request.email.clone(),
            display_name: request.display_name.clone(),
            password_hash,
            created_at: self.clock.now(),
        };

        let user = bounded(
            self.config.store_timeout,
            "user insert",
            self.users.insert(new_user),
        )
        .await?;

        tracing::info!("✅ User registered: {}", user.id);
        Ok(user.public())
    }

    /// Checks credentials and issues tokens (and a session, if enabled).
    ///
    /// An unknown email and a wrong password produce the same
    /// `InvalidCredentials` value after the same amount of hashing work.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginOutcome> {
        let email = normalize_email(&request.email);

        let Some(user) = self.find_by_email(&email).await? else {
            self.hasher.verify_decoy(&request.password).await?;
            tracing::warn!("❌ Login failed");
            return Err(AuthError::InvalidCredentials);
        };

        match self.hasher.verify(&request.password, &user.password_hash).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("❌ Login failed");
                return Err(AuthError::InvalidCredentials);
            }
            Err(AuthError::InvalidDigestFormat) => {
                tracing::error!("❌ Stored password digest unreadable for user: {}", user.id);
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        }

        let (tokens, refresh_jti, mut cookies) = self.issue_pair(user.id).await?;

        let session = if self.config.session_auth {
            match self.start_session(user.id).await {
                Ok((session, cookie)) => {
                    cookies.push(cookie);
                    Some(session)
                }
                Err(e) => {
                    self.discard_refresh(&refresh_jti).await;
                    return Err(e);
                }
            }
        } else {
            None
        };

        tracing::info!("✅ User logged in: {}", user.id);

        Ok(LoginOutcome {
            user: user.public(),
            tokens,
            session,
            cookies,
        })
    }

    /// Starts a server-side session and returns the cookie that carries it.
    pub async fn start_session(&self, user_id: Uuid) -> Result<(Session, CookieAction)> {
        let session = self.sessions.create(user_id).await?;
        let cookie = CookieAction::set(
            &self.config.cookies,
            SESSION_COOKIE,
            session.id.clone(),
            self.sessions.ttl().num_seconds(),
        );
        Ok((session, cookie))
    }

    /// Resolves the user behind a request.
    ///
    /// Tries the bearer token, then the access-token cookie, then the session
    /// cookie; the first one that verifies wins. A store failure stops the
    /// pipeline instead of being reported as a denial.
    pub async fn authenticate(&self, request: &RequestView) -> Result<PublicUser> {
        let credentials = extract_credentials(request);
        if credentials.is_empty() {
            tracing::debug!("No credential presented");
            return Err(AuthError::Unauthenticated);
        }

        for credential in credentials {
            let resolved = match self.verify_credential(credential).await {
                Ok(user_id) => self.resolve_user(user_id).await,
                Err(e) => Err(e),
            };

            match resolved {
                Ok(user) => {
                    tracing::debug!("✅ User authenticated via {}: {}", credential.kind(), user.id);
                    return Ok(user);
                }
                Err(e) if e.is_denial() => {
                    tracing::debug!("Credential rejected ({}): {}", credential.kind(), e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(AuthError::Unauthenticated)
    }

    async fn verify_credential(&self, credential: Credential<'_>) -> Result<Uuid> {
        match credential {
            Credential::Bearer(token) | Credential::AccessCookie(token) => self
                .tokens
                .verify(token, TokenClass::Access)
                .map(|verified| verified.subject),
            Credential::SessionCookie(session_id) => self
                .sessions
                .touch(session_id)
                .await?
                .map(|session| session.user_id)
                .ok_or(AuthError::Unauthenticated),
        }
    }

    async fn resolve_user(&self, user_id: Uuid) -> Result<PublicUser> {
        bounded(
            self.config.store_timeout,
            "user find_by_id",
            self.users.find_by_id(user_id),
        )
        .await?
        .map(|user| user.public())
        .ok_or(AuthError::Unauthenticated)
    }

    /// Ends the request's session and revokes its refresh token. Idempotent.
    pub async fn logout(&self, request: &RequestView) -> Result<LogoutOutcome> {
        if let Some(session_id) = request.session_id() {
            self.sessions.destroy(session_id).await?;
            tracing::info!("✅ Session destroyed on logout");
        }

        if let Some(token) = request.refresh_cookie() {
            self.revoke_refresh(token).await?;
        }

        let cookies = [SESSION_COOKIE, ACCESS_COOKIE, REFRESH_COOKIE]
            .into_iter()
            .map(|name| CookieAction::clear(&self.config.cookies, name))
            .collect();

        Ok(LogoutOutcome {
            message: "Logout successful".to_string(),
            cookies,
        })
    }

    /// Invalidates a refresh token. Unverifiable tokens are ignored.
    pub async fn revoke_refresh(&self, refresh_token: &str) -> Result<()> {
        if !self.config.refresh_revocation {
            return Ok(());
        }

        match self.tokens.verify(refresh_token, TokenClass::Refresh) {
            Ok(verified) => {
                bounded(
                    self.config.store_timeout,
                    "refresh revoke",
                    self.refresh_tokens.revoke(&verified.jti),
                )
                .await?;
                tracing::info!("✅ Refresh token revoked for user: {}", verified.subject);
            }
            Err(e) => {
                tracing::debug!("Ignoring unusable refresh token: {}", e);
            }
        }
        Ok(())
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// With revocation on, the presented token is consumed and its successor
    /// registered in one registry call; presenting it again fails with
    /// `TokenReuseDetected` and revokes every outstanding refresh token of the
    /// subject. With rotation on, the successor is a new refresh token;
    /// otherwise it is the presented one. A store failure leaves the
    /// presented token outstanding, so the caller can retry.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome> {
        let verified = self.tokens.verify(refresh_token, TokenClass::Refresh)?;
        let subject = verified.subject;

        if self.find_by_id(subject).await?.is_none() {
            tracing::warn!("❌ Refresh for unknown user: {}", subject);
            return Err(AuthError::Unauthenticated);
        }

        let access = self.tokens.issue_access(subject)?;
        let (refresh_value, successor) = if self.config.refresh_rotation {
            let rotated = self.tokens.issue_refresh(subject)?;
            let entry = RefreshEntry {
                jti: rotated.jti,
                user_id: subject,
                expires_at: rotated.expires_at,
            };
            (rotated.token, entry)
        } else {
            let entry = RefreshEntry {
                jti: verified.jti.clone(),
                user_id: subject,
                expires_at: verified.expires_at,
            };
            (refresh_token.to_string(), entry)
        };

        if self.config.refresh_revocation {
            let consumed = bounded(
                self.config.store_timeout,
                "refresh rotate",
                self.refresh_tokens
                    .rotate(&verified.jti, &successor, self.clock.now()),
            )
            .await?;

            if !consumed.is_some_and(|entry| entry.user_id == subject) {
                tracing::error!(
                    "🚨 Refresh token reuse detected for user {}; revoking all refresh tokens",
                    subject
                );
                let revoked = bounded(
                    self.config.store_timeout,
                    "refresh revoke_all",
                    self.refresh_tokens.revoke_all_for_user(subject),
                )
                .await?;
                tracing::warn!("🧹 Revoked {} refresh tokens for user: {}", revoked, subject);
                return Err(AuthError::TokenReuseDetected);
            }
        }

        let cookies = vec![
            self.token_cookie(ACCESS_COOKIE, access.token.clone(), access.expires_at),
            self.token_cookie(REFRESH_COOKIE, refresh_value.clone(), successor.expires_at),
        ];
        let tokens = TokenPair {
            access_token: access.token,
            refresh_token: refresh_value,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_ttl_secs(),
        };

        tracing::info!("✅ Tokens refreshed for user: {}", subject);
        Ok(RefreshOutcome { tokens, cookies })
    }

    /// Replaces a user's password and signs the user out everywhere.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: &ChangePasswordRequest,
    ) -> Result<()> {
        tracing::info!("🔑 Changing password for user: {}", user_id);

        let user = self.find_by_id(user_id).await?.ok_or(AuthError::Unauthenticated)?;

        match self.hasher.verify(&request.old_password, &user.password_hash).await {
            Ok(true) => {}
            Ok(false) | Err(AuthError::InvalidDigestFormat) => {
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        }

        validate_password(&request.new_password, self.config.password_min_length)?;

        let digest = self.hasher.hash(&request.new_password).await?;
        bounded(
            self.config.store_timeout,
            "user update_password",
            self.users.update_password(user_id, &digest),
        )
        .await?;

        if self.config.refresh_revocation {
            bounded(
                self.config.store_timeout,
                "refresh revoke_all",
                self.refresh_tokens.revoke_all_for_user(user_id),
            )
            .await?;
        }
        self.sessions.destroy_all_for_user(user_id).await?;

        tracing::info!("✅ Password changed for user: {}", user_id);
        Ok(())
    }

    /// Stores a value in the request's session data.
    pub async fn set_session_value(
        &self,
        request: &RequestView,
        key: &str,
        value: sonic_rs::Value,
    ) -> Result<Session> {
        let session_id = request.session_id().ok_or(AuthError::Unauthenticated)?;
        self.sessions
            .set_value(session_id, key, value)
            .await?
            .ok_or(AuthError::Unauthenticated)
    }

    /// Issues and registers a token pair. Also returns the refresh token's `jti`.
    async fn issue_pair(&self, user_id: Uuid) -> Result<(TokenPair, String, Vec<CookieAction>)> {
        let access = self.tokens.issue_access(user_id)?;
        let refresh = self.tokens.issue_refresh(user_id)?;

        if self.config.refresh_revocation {
            self.register_refresh(&refresh).await?;
        }

        let cookies = vec![
            self.token_cookie(ACCESS_COOKIE, access.token.clone(), access.expires_at),
            self.token_cookie(REFRESH_COOKIE, refresh.token.clone(), refresh.expires_at),
        ];
        Ok((self.tokens.pair(&access, &refresh), refresh.jti.clone(), cookies))
    }

    /// Best-effort removal of a registered refresh token the caller never received.
    async fn discard_refresh(&self, jti: &str) {
        if !self.config.refresh_revocation {
            return;
        }
        let revoked = bounded(
            self.config.store_timeout,
            "refresh revoke",
            self.refresh_tokens.revoke(jti),
        )
        .await;
        if let Err(e) = revoked {
            tracing::warn!("❌ Could not discard undelivered refresh token: {}", e);
        }
    }

    async fn register_refresh(&self, refresh: &IssuedToken) -> Result<()> {
        let entry = RefreshEntry {
            jti: refresh.jti.clone(),
            user_id: refresh.subject,
            expires_at: refresh.expires_at,
        };
        bounded(
            self.config.store_timeout,
            "refresh register",
            self.refresh_tokens.register(&entry, self.clock.now()),
        )
        .await
    }

    fn token_cookie(&self, name: &str, value: String, expires_at: DateTime<Utc>) -> CookieAction {
        let max_age = (expires_at - self.clock.now()).num_seconds().max(0);
        CookieAction::set(&self.config.cookies, name, value, max_age)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        bounded(
            self.config.store_timeout,
            "user find_by_email",
            self.users.find_by_email(email),
        )
        .await
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRecord>> {
        bounded(
            self.config.store_timeout,
            "user find_by_id",
            self.users.find_by_id(user_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_precedes_cookies() {
        let request = RequestView::new()
            .with_cookie(SESSION_COOKIE, "sid")
            .with_cookie(ACCESS_COOKIE, "cookie-token")
            .with_bearer("bearer-token");

        let kinds: Vec<&str> = extract_credentials(&request)
            .iter()
            .map(Credential::kind)
            .collect();
        assert_eq!(kinds, vec!["bearer", "access cookie", "session cookie"]);
    }

    #[test]
    fn empty_request_has_no_credentials() {
        assert!(extract_credentials(&RequestView::new()).is_empty());
    }
}
