use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::crypto::random::generate_token_id;
use crate::error::{AuthError, Result};
use crate::models::token::{Claims, IssuedToken, TokenClass, TokenPair, VerifiedToken};

struct ClassKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl ClassKeys {
    fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

/// Creates and verifies signed, time-bounded tokens.
///
/// Tokens are HS256 JWTs signed with one secret per token class. Expiry is
/// checked against the injected clock with zero leeway.
#[derive(Clone)]
pub struct TokenIssuer {
    access: Arc<ClassKeys>,
    refresh: Arc<ClassKeys>,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            access: Arc::new(ClassKeys::new(&config.access_secret, config.access_ttl)),
            refresh: Arc::new(ClassKeys::new(&config.refresh_secret, config.refresh_ttl)),
            clock,
        }
    }

    fn keys(&self, class: TokenClass) -> &ClassKeys {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    /// Access token lifetime in seconds.
    pub fn access_ttl_secs(&self) -> i64 {
        self.access.ttl.num_seconds()
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh.ttl.num_seconds()
    }

    pub fn issue_access(&self, subject: Uuid) -> Result<IssuedToken> {
        self.issue(subject, TokenClass::Access)
    }

    pub fn issue_refresh(&self, subject: Uuid) -> Result<IssuedToken> {
        self.issue(subject, TokenClass::Refresh)
    }

    fn issue(&self, subject: Uuid, class: TokenClass) -> Result<IssuedToken> {
        let keys = self.keys(class);
        let issued_at = truncate_to_seconds(self.clock.now());
        let expires_at = issued_at + keys.ttl;

        let claims = Claims {
            sub: subject,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: generate_token_id(),
            typ: class,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AuthError::Internal(format!("Failed to encode {} token: {}", class, e)))?;

        tracing::debug!("🎫 Issued {} token for {}", class, subject);

        Ok(IssuedToken {
            token,
            class,
            subject,
            jti: claims.jti,
            issued_at,
            expires_at,
        })
    }

    /// Builds the pair handed to the client after login or refresh.
    pub fn pair(&self, access: &IssuedToken, refresh: &IssuedToken) -> TokenPair {
        TokenPair {
            access_token: access.token.clone(),
            refresh_token: refresh.token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl_secs(),
        }
    }

    /// Verifies a token of the expected class.
    ///
    /// The class claim is read before the signature is checked; a token of
    /// the other class reports `TokenClassMismatch`.
    pub fn verify(&self, token: &str, expected: TokenClass) -> Result<VerifiedToken> {
        let presented = peek_class(token)?;
        if presented != expected {
            tracing::debug!("Token class mismatch: expected {}, got {}", expected, presented);
            return Err(AuthError::TokenClassMismatch);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        let data = decode::<Claims>(token, &self.keys(expected).decoding, &validation)
            .map_err(|e| map_jwt_error(e.kind()))?;
        let claims = data.claims;

        if claims.typ != expected {
            return Err(AuthError::TokenClassMismatch);
        }

        let issued_at = from_timestamp(claims.iat)?;
        let expires_at = from_timestamp(claims.exp)?;
        if self.clock.now() >= expires_at {
            tracing::debug!("Token expired for {}", claims.sub);
            return Err(AuthError::Expired);
        }

        Ok(VerifiedToken {
            subject: claims.sub,
            class: claims.typ,
            jti: claims.jti,
            issued_at,
            expires_at,
        })
    }
}

/// Reads the class claim without checking the signature.
fn peek_class(token: &str) -> Result<TokenClass> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims.typ)
        .map_err(|_| AuthError::MalformedToken)
}

fn map_jwt_error(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::MalformedToken,
    }
}

fn from_timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or(AuthError::MalformedToken)
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn setup() -> (TokenIssuer, ManualClock) {
        let config = AuthConfig::new(
            "test-access-secret-key-for-testing-0001",
            "test-refresh-secret-key-for-testing-0002",
        )
        .unwrap();
        let clock = ManualClock::default();
        (TokenIssuer::new(&config, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn access_token_verifies_until_expiry() {
        let (issuer, clock) = setup();
        let user = Uuid::new_v4();
        let issued = issuer.issue_access(user).unwrap();

        let verified = issuer.verify(&issued.token, TokenClass::Access).unwrap();
        assert_eq!(verified.subject, user);
        assert_eq!(verified.issued_at, issued.issued_at);

        clock.set(issued.expires_at - Duration::seconds(1));
        assert!(issuer.verify(&issued.token, TokenClass::Access).is_ok());

        clock.set(issued.expires_at);
        assert_eq!(
            issuer.verify(&issued.token, TokenClass::Access),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn refresh_token_lives_seven_days() {
        let (issuer, clock) = setup();
        let issued = issuer.issue_refresh(Uuid::new_v4()).unwrap();
        assert_eq!(issued.expires_at - issued.issued_at, Duration::days(7));

        clock.advance(Duration::days(7));
        assert_eq!(
            issuer.verify(&issued.token, TokenClass::Refresh),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn classes_are_not_interchangeable() {
        let (issuer, _) = setup();
        let user = Uuid::new_v4();
        let access = issuer.issue_access(user).unwrap();
        let refresh = issuer.issue_refresh(user).unwrap();

        assert_eq!(
            issuer.verify(&access.token, TokenClass::Refresh),
            Err(AuthError::TokenClassMismatch)
        );
        assert_eq!(
            issuer.verify(&refresh.token, TokenClass::Access),
            Err(AuthError::TokenClassMismatch)
        );
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let (issuer, _) = setup();
        let issued = issuer.issue_access(Uuid::new_v4()).unwrap();
        let (body, signature) = issued.token.rsplit_once('.').unwrap();
        let flipped = if signature.starts_with('A') { "B" } else { "A" };
        let forged = format!("{}.{}{}", body, flipped, &signature[1..]);

        assert_eq!(
            issuer.verify(&forged, TokenClass::Access),
            Err(AuthError::SignatureInvalid)
        );
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let (issuer, _) = setup();
        let other_config = AuthConfig::new(
            "another-access-secret-key-for-testing-9",
            "another-refresh-secret-key-for-testing-9",
        )
        .unwrap();
        let other = TokenIssuer::new(&other_config, Arc::new(ManualClock::default()));
        let foreign = other.issue_access(Uuid::new_v4()).unwrap();

        assert_eq!(
            issuer.verify(&foreign.token, TokenClass::Access),
            Err(AuthError::SignatureInvalid)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let (issuer, _) = setup();
        for garbage in ["", "invalid-token", "a.b.c", "x.y"] {
            assert_eq!(
                issuer.verify(garbage, TokenClass::Access),
                Err(AuthError::MalformedToken)
            );
        }
    }

    #[test]
    fn every_token_gets_a_fresh_jti() {
        let (issuer, _) = setup();
        let user = Uuid::new_v4();
        let a = issuer.issue_refresh(user).unwrap();
        let b = issuer.issue_refresh(user).unwrap();
        assert_ne!(a.jti, b.jti);
        assert_ne!(a.token, b.token);
    }
}
