use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::password::PasswordDigest;

/// Represents a user in the credential store.
///
/// Not `Serialize`. Callers outside the module receive a
/// [`PublicUser`] instead.
#[derive(Clone, Debug)]
pub struct UserRecord {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's email address, trimmed and lowercased.
    pub email: String,
    /// The user's display name.
    pub display_name: String,
    /// The user's password digest.
    pub password_hash: PasswordDigest,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// The projection that may leave the module.
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            created_at: self.created_at,
        }
    }
}

/// A user about to be inserted. The digest can only come from the password hasher.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub password_hash: PasswordDigest,
    pub created_at: DateTime<Utc>,
}

impl NewUser {
    pub fn into_record(self) -> UserRecord {
        UserRecord {
            id: self.id,
            email: self.email,
            display_name: self.display_name,
            password_hash: self.password_hash,
            created_at: self.created_at,
        }
    }
}

/// The user's public projection, without the password digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}
