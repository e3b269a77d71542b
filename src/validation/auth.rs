use garde::Validate;
use serde::Deserialize;
use zeroize::Zeroize;

use crate::error::{AuthError, Result};

/// Longest password accepted, to keep hashing cost bounded.
pub const PASSWORD_MAX_LENGTH: usize = 128;

/// The request payload for user registration.
#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[garde(email, length(max = 254))]
    pub email: String,
    #[garde(skip)]
    pub password: String,
    #[garde(length(chars, min = 1, max = 100))]
    pub display_name: String,
}

/// The request payload for user login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The request payload for a token refresh.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// The request payload for changing a user's password.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

impl Drop for RegisterRequest {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl Drop for LoginRequest {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl Drop for ChangePasswordRequest {
    fn drop(&mut self) {
        self.old_password.zeroize();
        self.new_password.zeroize();
    }
}

/// Normalizes an email address for lookup and storage.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates the registration payload's email and display name.
///
/// `email` must already be normalized.
pub fn validate_registration(request: &RegisterRequest) -> Result<()> {
    request
        .validate()
        .map_err(|report| AuthError::Validation(report.to_string()))
}

/// Validates a password against the password policy.
///
/// # Arguments
///
/// * `password` - The password to validate.
/// * `min_length` - The configured minimum length, in characters.
///
/// # Returns
///
/// A `Result<()>`, `WeakPassword` describing the first unmet rule.
pub fn validate_password(password: &str, min_length: usize) -> Result<()> {
    let length = password.chars().count();

    if length < min_length {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at least {} characters long",
            min_length
        )));
    }

    if length > PASSWORD_MAX_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password must be at most {} characters",
            PASSWORD_MAX_LENGTH
        )));
    }

    if !password.chars().any(char::is_alphabetic) || !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one letter and one digit".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(email: &str, display_name: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "Password123".to_string(),
            display_name: display_name.to_string(),
        }
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
    }

    #[test]
    fn password_policy() {
        assert!(validate_password("Password123", 8).is_ok());
        assert!(matches!(validate_password("Pass1", 8), Err(AuthError::WeakPassword(_))));
        assert!(matches!(validate_password("passwordonly", 8), Err(AuthError::WeakPassword(_))));
        assert!(matches!(validate_password("1234567890", 8), Err(AuthError::WeakPassword(_))));
        let long = format!("a1{}", "x".repeat(PASSWORD_MAX_LENGTH));
        assert!(matches!(validate_password(&long, 8), Err(AuthError::WeakPassword(_))));
    }

    #[test]
    fn weak_password_message_does_not_echo_the_password() {
        let err = validate_password("hunter", 8).unwrap_err();
        assert!(!err.to_string().contains("hunter"));
    }

    #[test]
    fn registration_payload_validation() {
        assert!(validate_registration(&register("a@x.com", "A")).is_ok());
        assert!(matches!(
            validate_registration(&register("not-an-email", "A")),
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            validate_registration(&register("a@x.com", "")),
            Err(AuthError::Validation(_))
        ));
    }

    #[test]
    fn payloads_use_camel_case() {
        let request: RegisterRequest = sonic_rs::from_str(
            r#"{"email":"a@x.com","password":"Password123","displayName":"A"}"#,
        )
        .unwrap();
        assert_eq!(request.display_name, "A");

        let refresh: RefreshRequest = sonic_rs::from_str(r#"{"refreshToken":"t"}"#).unwrap();
        assert_eq!(refresh.refresh_token, "t");
    }
}
