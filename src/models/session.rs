use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a server-side user session.
///
/// `id` is the opaque value handed to the client in the session cookie.
/// A session is `Active` until `expires_at`; after that, or once destroyed,
/// it is gone for good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// The opaque session identifier.
    pub id: String,
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// Application-defined values (view counters, pending flags, ...).
    #[serde(default)]
    pub data: HashMap<String, sonic_rs::Value>,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A session is expired from its `expires_at` instant onwards.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn get(&self, key: &str) -> Option<&sonic_rs::Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: sonic_rs::Value) {
        self.data.insert(key.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let now = Utc::now();
        let session = Session {
            id: "s".into(),
            user_id: Uuid::nil(),
            data: HashMap::new(),
            created_at: now,
            expires_at: now + Duration::hours(1),
        };
        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(now + Duration::hours(1)));
    }

    #[test]
    fn round_trips_through_json_with_data() {
        let now = Utc::now();
        let mut session = Session {
            id: "abc".into(),
            user_id: Uuid::new_v4(),
            data: HashMap::new(),
            created_at: now,
            expires_at: now + Duration::minutes(5),
        };
        session.insert("views", sonic_rs::json!(3));

        let json = sonic_rs::to_string(&session).unwrap();
        let back: Session = sonic_rs::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}
