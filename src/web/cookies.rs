use tower_cookies::cookie::{SameSite, time::Duration};
use tower_cookies::{Cookie, Cookies};

use crate::config::CookieSettings;

/// Cookie carrying the opaque session identifier.
pub const SESSION_COOKIE: &str = "sessionId";
/// Cookie carrying the access token.
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";

/// A cookie the host should set on the response.
#[derive(Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub max_age_secs: i64,
    pub domain: Option<String>,
    pub path: String,
}

impl std::fmt::Debug for SetCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetCookie")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("http_only", &self.http_only)
            .field("secure", &self.secure)
            .field("same_site", &self.same_site)
            .field("max_age_secs", &self.max_age_secs)
            .field("domain", &self.domain)
            .field("path", &self.path)
            .finish()
    }
}

/// A cookie the host should expire on the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearCookie {
    pub name: String,
    pub domain: Option<String>,
    pub path: String,
}

/// A response-side cookie directive.
///
/// The module never touches the response itself; the host applies these,
/// for example with [`apply_cookie_actions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieAction {
    Set(SetCookie),
    Clear(ClearCookie),
}

impl CookieAction {
    /// Creates a secure, http-only cookie with the given name, value, and max age.
    pub fn set(settings: &CookieSettings, name: &str, value: String, max_age_secs: i64) -> Self {
        CookieAction::Set(SetCookie {
            name: name.to_string(),
            value,
            http_only: true,
            secure: settings.secure,
            same_site: settings.same_site,
            max_age_secs,
            domain: settings.domain.clone(),
            path: settings.path.clone(),
        })
    }

    pub fn clear(settings: &CookieSettings, name: &str) -> Self {
        CookieAction::Clear(ClearCookie {
            name: name.to_string(),
            domain: settings.domain.clone(),
            path: settings.path.clone(),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            CookieAction::Set(set) => &set.name,
            CookieAction::Clear(clear) => &clear.name,
        }
    }

    /// Renders the directive as a `tower_cookies` cookie.
    pub fn to_cookie(&self) -> Cookie<'static> {
        match self {
            CookieAction::Set(set) => {
                let mut cookie = Cookie::new(set.name.clone(), set.value.clone());
                cookie.set_http_only(set.http_only);
                cookie.set_secure(set.secure);
                cookie.set_same_site(set.same_site);
                cookie.set_max_age(Duration::seconds(set.max_age_secs));
                cookie.set_path(set.path.clone());
                if let Some(domain) = &set.domain {
                    cookie.set_domain(domain.clone());
                }
                cookie
            }
            CookieAction::Clear(clear) => {
                let mut cookie = Cookie::new(clear.name.clone(), "");
                cookie.set_max_age(Duration::seconds(0));
                cookie.set_path(clear.path.clone());
                if let Some(domain) = &clear.domain {
                    cookie.set_domain(domain.clone());
                }
                cookie
            }
        }
    }
}

/// Applies cookie directives to a `tower_cookies` jar.
pub fn apply_cookie_actions(cookies: &Cookies, actions: &[CookieAction]) {
    for action in actions {
        match action {
            CookieAction::Set(_) => cookies.add(action.to_cookie()),
            CookieAction::Clear(_) => cookies.remove(action.to_cookie()),
        }
        tracing::debug!("🍪 Cookie directive applied: {}", action.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_directive_renders_security_flags() {
        let settings = CookieSettings {
            secure: true,
            same_site: SameSite::Strict,
            domain: Some("example.com".to_string()),
            path: "/".to_string(),
        };
        let cookie = CookieAction::set(&settings, SESSION_COOKIE, "abc".to_string(), 3600).to_cookie();

        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(3600)));
        assert_eq!(cookie.domain(), Some("example.com"));
    }

    #[test]
    fn clear_directive_expires_immediately() {
        let cookie = CookieAction::clear(&CookieSettings::default(), ACCESS_COOKIE).to_cookie();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::seconds(0)));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn debug_redacts_cookie_values() {
        let action = CookieAction::set(&CookieSettings::default(), REFRESH_COOKIE, "secret".into(), 1);
        assert!(!format!("{:?}", action).contains("secret"));
    }
}
