use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::FromRequestParts;
use http::{HeaderMap, header, request::Parts};
use tower_cookies::Cookie;

use super::cookies::{ACCESS_COOKIE, REFRESH_COOKIE, SESSION_COOKIE};

/// What the module needs to know about an inbound request.
#[derive(Clone, Default)]
pub struct RequestView {
    /// The credential from `Authorization: Bearer <token>`, if any.
    pub bearer: Option<String>,
    /// Named cookie values.
    pub cookies: HashMap<String, String>,
}

impl std::fmt::Debug for RequestView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.cookies.keys().collect();
        names.sort();
        f.debug_struct("RequestView")
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("cookies", &names)
            .finish()
    }
}

impl RequestView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Builds the view from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        let mut cookies = HashMap::new();
        for value in headers.get_all(header::COOKIE) {
            let Ok(raw) = value.to_str() else {
                tracing::debug!("Skipping non-UTF-8 cookie header");
                continue;
            };
            for cookie in Cookie::split_parse(raw).flatten() {
                cookies.insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }

        Self { bearer, cookies }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.cookie(SESSION_COOKIE)
    }

    pub fn access_cookie(&self) -> Option<&str> {
        self.cookie(ACCESS_COOKIE)
    }

    pub fn refresh_cookie(&self) -> Option<&str> {
        self.cookie(REFRESH_COOKIE)
    }
}

impl<S> FromRequestParts<S> for RequestView
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestView::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn parses_bearer_and_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("sessionId=s1; access_token=a1"),
        );
        headers.append(header::COOKIE, HeaderValue::from_static("refresh_token=r1"));

        let view = RequestView::from_headers(&headers);
        assert_eq!(view.bearer.as_deref(), Some("abc.def.ghi"));
        assert_eq!(view.session_id(), Some("s1"));
        assert_eq!(view.access_cookie(), Some("a1"));
        assert_eq!(view.refresh_cookie(), Some("r1"));
    }

    #[test]
    fn ignores_other_schemes_and_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        headers.insert(header::COOKIE, HeaderValue::from_static("sessionId="));

        let view = RequestView::from_headers(&headers);
        assert!(view.bearer.is_none());
        assert!(view.session_id().is_none());
    }

    #[test]
    fn debug_hides_credentials() {
        let view = RequestView::new()
            .with_bearer("bearer-value-123")
            .with_cookie(SESSION_COOKIE, "session-value-456");
        let rendered = format!("{:?}", view);
        assert!(!rendered.contains("bearer-value-123"));
        assert!(!rendered.contains("session-value-456"));
        assert!(rendered.contains(SESSION_COOKIE));
    }
}
