use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;

/// The size of a session identifier in bytes (256 bits of entropy).
const SESSION_ID_SIZE: usize = 32;
/// The size of a token ID in bytes.
const TOKEN_ID_SIZE: usize = 16;

/// Generates a new random session identifier.
///
/// # Returns
///
/// A URL-safe base64-encoded identifier, suitable as a cookie value.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_SIZE];
    OsRng.fill_bytes(&mut bytes);

    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a random token identifier string (32 hex characters)
pub fn generate_token_id() -> String {
    let mut bytes = [0u8; TOKEN_ID_SIZE];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn session_ids_are_url_safe_and_distinct() {
        let ids: HashSet<String> = (0..64).map(|_| generate_session_id()).collect();
        assert_eq!(ids.len(), 64);
        for id in &ids {
            assert_eq!(id.len(), 43);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn token_ids_are_hex() {
        let id = generate_token_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
