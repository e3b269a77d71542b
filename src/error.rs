use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The authentication module's error type.
///
/// Messages never carry plaintext passwords, digests, token bodies or
/// secret material. Store failures keep their cause in the logs only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown email or wrong password. Both cases produce this exact value.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The normalized email is already registered.
    #[error("Email already registered")]
    DuplicateEmail,

    /// The password does not meet the password policy.
    #[error("Weak password: {0}")]
    WeakPassword(String),

    /// A request payload failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No usable credential was presented.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// A token signature does not match its contents.
    #[error("Token signature invalid")]
    SignatureInvalid,

    /// A token or session is past its expiry instant.
    #[error("Token expired")]
    Expired,

    /// A token does not have the expected structure.
    #[error("Malformed token")]
    MalformedToken,

    /// An access token was presented where a refresh token is expected, or the reverse.
    #[error("Token class mismatch")]
    TokenClassMismatch,

    /// A refresh token was redeemed after it had already been rotated away or revoked.
    #[error("Refresh token reuse detected")]
    TokenReuseDetected,

    /// A stored password digest could not be parsed.
    #[error("Invalid password digest format")]
    InvalidDigestFormat,

    /// A backing store failed or timed out.
    #[error("Store unavailable")]
    StoreUnavailable,

    /// An internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AuthError` as the error type.
pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Collapses the error into what may be shown to a client.
    ///
    /// Token and session failures, reuse detection included, all become
    /// `Unauthenticated` so a caller cannot tell which check rejected it.
    /// Validation errors pass through. Nothing is logged here; reuse is
    /// logged where it is detected.
    pub fn public(self) -> AuthError {
        match self {
            AuthError::SignatureInvalid
            | AuthError::Expired
            | AuthError::MalformedToken
            | AuthError::TokenClassMismatch
            | AuthError::TokenReuseDetected
            | AuthError::Unauthenticated => AuthError::Unauthenticated,
            AuthError::InvalidDigestFormat => {
                AuthError::Internal("password digest".to_string())
            }
            other => other,
        }
    }

    /// Whether the error denies access, as opposed to a validation or infrastructure failure.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::Unauthenticated
                | AuthError::SignatureInvalid
                | AuthError::Expired
                | AuthError::MalformedToken
                | AuthError::TokenClassMismatch
                | AuthError::TokenReuseDetected
        )
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(e: redis::RedisError) -> Self {
        tracing::error!("❌ Redis error: {}", e);
        AuthError::StoreUnavailable
    }
}

impl From<tokio_postgres::Error> for AuthError {
    fn from(e: tokio_postgres::Error) -> Self {
        tracing::error!("❌ Database error: {}", e);
        AuthError::StoreUnavailable
    }
}

impl From<deadpool_postgres::PoolError> for AuthError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        tracing::error!("❌ Database pool error: {}", e);
        AuthError::StoreUnavailable
    }
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(e: tokio::task::JoinError) -> Self {
        AuthError::Internal(format!("Blocking task failed: {}", e))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self.public() {
            AuthError::InvalidCredentials => {
                tracing::warn!("Login rejected");
                (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string())
            }

            AuthError::Unauthenticated => {
                tracing::warn!("Authentication failed");
                (StatusCode::UNAUTHORIZED, "Unauthenticated".to_string())
            }

            AuthError::DuplicateEmail => {
                tracing::debug!("Duplicate email on register");
                (StatusCode::CONFLICT, "Email already registered".to_string())
            }

            AuthError::WeakPassword(msg) => {
                tracing::debug!("Weak password: {}", msg);
                (StatusCode::BAD_REQUEST, msg)
            }

            AuthError::Validation(msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg)
            }

            AuthError::StoreUnavailable => {
                tracing::error!("Store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string())
            }

            other => {
                tracing::error!("Internal error: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, [(http::header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn normalizing_reuse_does_not_log_again() {
        let buffer = Captured::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            assert_eq!(AuthError::TokenReuseDetected.public(), AuthError::Unauthenticated);
            assert!(buffer.0.lock().unwrap().is_empty());

            tracing::error!("capture check");
            assert!(!buffer.0.lock().unwrap().is_empty());
        });
    }

    #[test]
    fn token_failures_collapse_to_unauthenticated() {
        for err in [
            AuthError::SignatureInvalid,
            AuthError::Expired,
            AuthError::MalformedToken,
            AuthError::TokenClassMismatch,
            AuthError::TokenReuseDetected,
        ] {
            assert_eq!(err.public(), AuthError::Unauthenticated);
        }
    }

    #[test]
    fn validation_errors_pass_through() {
        assert_eq!(AuthError::DuplicateEmail.public(), AuthError::DuplicateEmail);
        assert_eq!(
            AuthError::WeakPassword("too short".into()).public(),
            AuthError::WeakPassword("too short".into())
        );
        assert_eq!(AuthError::InvalidCredentials.public(), AuthError::InvalidCredentials);
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            AuthError::Expired.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::DuplicateEmail.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthError::StoreUnavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AuthError::InvalidDigestFormat.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
