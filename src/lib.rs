//! Session and token authentication.
//!
//! [`Authenticator`] composes password hashing, server-side sessions and
//! signed access/refresh tokens into register / login / authenticate /
//! logout / refresh flows. It works through store handles supplied by the
//! host ([`AuthStores`]) and answers with values plus explicit cookie
//! directives; routing and response writing stay with the host.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod telemetry;

pub mod crypto {
    pub mod password;
    pub mod random;
    pub mod token;
}

pub mod models {
    pub mod session;
    pub mod token;
    pub mod user;
}

pub mod repositories {
    mod indexed;
    pub mod memory;
    pub mod refresh;
    pub mod session;
    pub mod timeout;
    pub mod user;
}

pub mod services {
    pub mod auth;
    pub mod session;
}

pub mod validation {
    pub mod auth;
}

pub mod web {
    pub mod cookies;
    pub mod request;
}

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, CookieSettings, HasherConfig};
pub use crypto::password::{PasswordDigest, PasswordHasher};
pub use crypto::token::TokenIssuer;
pub use error::{AuthError, Result};
pub use models::session::Session;
pub use models::token::{TokenClass, TokenPair, VerifiedToken};
pub use models::user::{PublicUser, UserRecord};
pub use repositories::refresh::RefreshRegistry;
pub use repositories::session::SessionStore;
pub use repositories::user::UserStore;
pub use services::auth::{AuthStores, Authenticator, LoginOutcome, LogoutOutcome, RefreshOutcome};
pub use services::session::SessionManager;
pub use validation::auth::{ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest};
pub use web::cookies::{CookieAction, apply_cookie_actions};
pub use web::request::RequestView;
