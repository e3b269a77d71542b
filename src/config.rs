use std::env;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Duration;
use tower_cookies::cookie::SameSite;
use zeroize::Zeroizing;

/// Minimum accepted length of each token-signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Argon2id cost parameters and the size of the hashing worker pool.
#[derive(Clone, Debug)]
pub struct HasherConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of iterations.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
    /// Maximum number of hashes computed at the same time.
    pub workers: usize,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 3,
            parallelism: 6,
            workers: 4,
        }
    }
}

/// Flags applied to every cookie the module asks the host to set.
#[derive(Clone, Debug)]
pub struct CookieSettings {
    pub secure: bool,
    pub same_site: SameSite,
    pub domain: Option<String>,
    pub path: String,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true,
            same_site: SameSite::Lax,
            domain: None,
            path: "/".to_string(),
        }
    }
}

/// The authentication module's configuration, supplied by the host.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret for access tokens.
    pub access_secret: Zeroizing<Vec<u8>>,
    /// HMAC secret for refresh tokens. Must differ from `access_secret`.
    pub refresh_secret: Zeroizing<Vec<u8>>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub session_ttl: Duration,
    /// Extend a session's expiry on every authenticated use.
    pub sliding_sessions: bool,
    /// Create a server-side session on login in addition to the tokens.
    pub session_auth: bool,
    /// Persist refresh tokens so they can be revoked and reuse detected.
    pub refresh_revocation: bool,
    /// Issue a fresh refresh token on every redemption.
    pub refresh_rotation: bool,
    pub password_min_length: usize,
    pub cookies: CookieSettings,
    pub hasher: HasherConfig,
    /// Upper bound for any single store call.
    pub store_timeout: StdDuration,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("session_ttl", &self.session_ttl)
            .field("sliding_sessions", &self.sliding_sessions)
            .field("session_auth", &self.session_auth)
            .field("refresh_revocation", &self.refresh_revocation)
            .field("refresh_rotation", &self.refresh_rotation)
            .field("password_min_length", &self.password_min_length)
            .field("cookies", &self.cookies)
            .field("hasher", &self.hasher)
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

impl AuthConfig {
    /// Creates a configuration with the recommended defaults and the given secrets.
    pub fn new(access_secret: impl Into<Vec<u8>>, refresh_secret: impl Into<Vec<u8>>) -> Result<Self> {
        let config = Self {
            access_secret: Zeroizing::new(access_secret.into()),
            refresh_secret: Zeroizing::new(refresh_secret.into()),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            session_ttl: Duration::hours(1),
            sliding_sessions: true,
            session_auth: true,
            refresh_revocation: true,
            refresh_rotation: true,
            password_min_length: 8,
            cookies: CookieSettings::default(),
            hasher: HasherConfig::default(),
            store_timeout: StdDuration::from_secs(2),
        };
        config.validate()?;
        Ok(config)
    }

    /// Creates a new `AuthConfig` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AuthConfig`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let access_secret = env::var("ACCESS_TOKEN_SECRET")
            .context("ACCESS_TOKEN_SECRET must be set (generate with: openssl rand -hex 32)")?;
        let refresh_secret = env::var("REFRESH_TOKEN_SECRET")
            .context("REFRESH_TOKEN_SECRET must be set (generate with: openssl rand -hex 32)")?;

        let mut config = Self::new(access_secret.into_bytes(), refresh_secret.into_bytes())?;

        let is_production = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string()) == "production";

        config.access_ttl = Duration::seconds(parse_var("ACCESS_TOKEN_TTL_SECS", 15 * 60)?);
        config.refresh_ttl = Duration::seconds(parse_var("REFRESH_TOKEN_TTL_SECS", 7 * 86400)?);
        config.session_ttl = Duration::seconds(parse_var("SESSION_TTL_SECS", 3600)?);
        config.sliding_sessions = parse_var("SESSION_SLIDING", true)?;
        config.session_auth = parse_var("SESSION_AUTH", true)?;
        config.refresh_revocation = parse_var("REFRESH_REVOCATION", true)?;
        config.refresh_rotation = parse_var("REFRESH_ROTATION", true)?;
        config.password_min_length = parse_var("PASSWORD_MIN_LENGTH", 8)?;
        config.store_timeout = StdDuration::from_millis(parse_var("STORE_TIMEOUT_MS", 2000)?);

        config.cookies = CookieSettings {
            secure: parse_var("COOKIE_SECURE", is_production)?,
            same_site: parse_same_site(
                &env::var("COOKIE_SAME_SITE").unwrap_or_else(|_| "lax".to_string()),
            )?,
            domain: env::var("COOKIE_DOMAIN").ok().filter(|d| !d.trim().is_empty()),
            path: "/".to_string(),
        };

        let defaults = HasherConfig::default();
        config.hasher = HasherConfig {
            memory_kib: parse_var("ARGON2_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_var("ARGON2_ITERATIONS", defaults.iterations)?,
            parallelism: parse_var("ARGON2_PARALLELISM", defaults.parallelism)?,
            workers: parse_var("HASHING_WORKERS", defaults.workers)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.access_secret.len() < MIN_SECRET_LEN || self.refresh_secret.len() < MIN_SECRET_LEN {
            anyhow::bail!("Token secrets must be at least {} bytes", MIN_SECRET_LEN);
        }
        if self.access_secret.as_slice() == self.refresh_secret.as_slice() {
            anyhow::bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }
        if self.access_ttl <= Duration::zero()
            || self.refresh_ttl <= Duration::zero()
            || self.session_ttl <= Duration::zero()
        {
            anyhow::bail!("Token and session TTLs must be positive");
        }
        if self.hasher.workers == 0 {
            anyhow::bail!("HASHING_WORKERS must be at least 1");
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

fn parse_same_site(raw: &str) -> Result<SameSite> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "strict" => Ok(SameSite::Strict),
        "lax" => Ok(SameSite::Lax),
        "none" => Ok(SameSite::None),
        other => anyhow::bail!("Invalid COOKIE_SAME_SITE: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS: &str = "access-secret-access-secret-access-secret";
    const REFRESH: &str = "refresh-secret-refresh-secret-refresh-secret";

    #[test]
    fn defaults_match_recommended_lifetimes() {
        let config = AuthConfig::new(ACCESS, REFRESH).unwrap();
        assert_eq!(config.access_ttl, Duration::minutes(15));
        assert_eq!(config.refresh_ttl, Duration::days(7));
        assert_eq!(config.password_min_length, 8);
        assert!(config.refresh_rotation);
    }

    #[test]
    fn rejects_identical_secrets() {
        assert!(AuthConfig::new(ACCESS, ACCESS).is_err());
    }

    #[test]
    fn rejects_short_secrets() {
        assert!(AuthConfig::new("short", REFRESH).is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = AuthConfig::new(ACCESS, REFRESH).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(ACCESS));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn same_site_parsing() {
        assert_eq!(parse_same_site("Strict").unwrap(), SameSite::Strict);
        assert_eq!(parse_same_site("none").unwrap(), SameSite::None);
        assert!(parse_same_site("sideways").is_err());
    }
}
