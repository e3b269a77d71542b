use std::sync::{Arc, OnceLock};

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use rand::RngCore;
use rand::rngs::OsRng;
use tokio::sync::Semaphore;
use zeroize::{Zeroize, Zeroizing};

use crate::config::HasherConfig;
use crate::error::{AuthError, Result};

/// An argon2id PHC string (`$argon2id$v=19$m=..,t=..,p=..$salt$hash`).
///
/// Only [`hash_password`] creates new digests; [`PasswordDigest::from_stored`]
/// exists for store adapters reading back what was persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Wraps a digest loaded from a store.
    pub fn from_stored(phc: String) -> Self {
        Self(phc)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordDigest(<redacted>)")
    }
}

/// Hashes a password using Argon2id with a fresh random salt.
///
/// # Arguments
///
/// * `password` - The password to hash.
/// * `config` - The cost parameters embedded into the digest.
///
/// # Returns
///
/// A `Result` containing the digest.
pub fn hash_password(password: &str, config: &HasherConfig) -> Result<PasswordDigest> {
    let mut password_bytes = password.as_bytes().to_vec();

    let mut salt_bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut salt_bytes)
        .map_err(|e| AuthError::Internal(format!("Failed to generate salt: {}", e)))?;

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AuthError::Internal(format!("Salt encoding error: {}", e)))?;

    let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
        .map_err(|e| AuthError::Internal(format!("Argon2 params: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let digest = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AuthError::Internal(format!("Argon2 hash error: {}", e)))?
        .to_string();

    password_bytes.zeroize();
    tracing::debug!("Password hashed successfully with Argon2");
    Ok(PasswordDigest(digest))
}

/// Verifies a password against a digest.
///
/// The salt and cost parameters come from the digest itself; the final
/// comparison is constant time.
///
/// # Returns
///
/// `Ok(true)` on a match, `Ok(false)` on a mismatch, and
/// `InvalidDigestFormat` if `digest` is not a parseable PHC string.
pub fn verify_password(password: &str, digest: &str) -> Result<bool> {
    let parsed = PasswordHash::new(digest).map_err(|_| AuthError::InvalidDigestFormat)?;

    let mut password_bytes = password.as_bytes().to_vec();
    let outcome = Argon2::default().verify_password(&password_bytes, &parsed);
    password_bytes.zeroize();

    tracing::debug!("Password verification completed");
    match outcome {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(_) => Err(AuthError::InvalidDigestFormat),
    }
}

/// Bounds how many CPU-bound hashes run at once, off the async executor.
#[derive(Clone)]
pub struct HashingPool {
    semaphore: Arc<Semaphore>,
}

impl HashingPool {
    /// Creates a new `HashingPool`.
    pub fn new(workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Runs `job` on the blocking thread pool once a slot is free.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AuthError::Internal(format!("Hashing pool closed: {}", e)))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await?
    }

    /// Returns the number of free hashing slots.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Async password hashing and verification on a bounded worker pool.
#[derive(Clone)]
pub struct PasswordHasher {
    config: HasherConfig,
    pool: HashingPool,
    decoy: Arc<OnceLock<PasswordDigest>>,
}

impl PasswordHasher {
    pub fn new(config: HasherConfig) -> Self {
        let pool = HashingPool::new(config.workers);
        Self {
            config,
            pool,
            decoy: Arc::new(OnceLock::new()),
        }
    }

    pub async fn hash(&self, password: &str) -> Result<PasswordDigest> {
        let password = Zeroizing::new(password.to_owned());
        let config = self.config.clone();
        self.pool.run(move || hash_password(&password, &config)).await
    }

    pub async fn verify(&self, password: &str, digest: &PasswordDigest) -> Result<bool> {
        let password = Zeroizing::new(password.to_owned());
        let digest = digest.clone();
        self.pool
            .run(move || verify_password(&password, digest.as_str()))
            .await
    }

    /// Spends one verification's worth of work against a throwaway digest.
    ///
    /// Used when the account does not exist, so the response time of a
    /// failed login does not reveal whether the email is registered.
    pub async fn verify_decoy(&self, password: &str) -> Result<()> {
        let password = Zeroizing::new(password.to_owned());
        let config = self.config.clone();
        let decoy = self.decoy.clone();
        self.pool
            .run(move || {
                let digest = match decoy.get() {
                    Some(digest) => digest.clone(),
                    None => {
                        let mut seed = [0u8; 32];
                        OsRng.fill_bytes(&mut seed);
                        let fresh = hash_password(&hex::encode(seed), &config)?;
                        seed.zeroize();
                        decoy.get_or_init(|| fresh).clone()
                    }
                };
                verify_password(&password, digest.as_str()).map(|_| ())
            })
            .await
    }

    pub fn pool(&self) -> &HashingPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> HasherConfig {
        HasherConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
            workers: 2,
        }
    }

    #[test]
    fn hash_then_verify() {
        let digest = hash_password("Password123", &cheap()).unwrap();
        assert!(verify_password("Password123", digest.as_str()).unwrap());
        assert!(!verify_password("Password124", digest.as_str()).unwrap());
    }

    #[test]
    fn same_input_yields_distinct_digests_that_both_verify() {
        let first = hash_password("correct horse 1", &cheap()).unwrap();
        let second = hash_password("correct horse 1", &cheap()).unwrap();
        assert_ne!(first, second);
        assert!(verify_password("correct horse 1", first.as_str()).unwrap());
        assert!(verify_password("correct horse 1", second.as_str()).unwrap());
    }

    #[test]
    fn digest_embeds_cost_parameters() {
        let digest = hash_password("Password123", &cheap()).unwrap();
        assert!(digest.as_str().starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));
    }

    #[test]
    fn malformed_digest_is_rejected() {
        assert_eq!(
            verify_password("Password123", "not-a-digest"),
            Err(AuthError::InvalidDigestFormat)
        );
    }

    #[test]
    fn debug_never_prints_the_digest() {
        let digest = hash_password("Password123", &cheap()).unwrap();
        assert_eq!(format!("{:?}", digest), "PasswordDigest(<redacted>)");
    }

    #[tokio::test]
    async fn async_hasher_round_trip_and_decoy() {
        let hasher = PasswordHasher::new(cheap());
        let digest = hasher.hash("Password123").await.unwrap();
        assert!(hasher.verify("Password123", &digest).await.unwrap());
        assert!(!hasher.verify("nope", &digest).await.unwrap());
        hasher.verify_decoy("whatever").await.unwrap();
        hasher.verify_decoy("again").await.unwrap();
        assert_eq!(hasher.pool().available_permits(), 2);
    }
}
