//! Route handlers and the request-context helpers they share.

use axum::http::HeaderMap;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::api::error::AuthError;

use self::auth::state::AuthState;

pub mod auth;
pub mod health;
pub mod me;
pub mod root;

/// Header carrying the tenant identifier for every auth route.
pub const TENANT_HEADER: &str = "x-accesso-service";
/// Optional header identifying the client device for session scoping.
pub const DEVICE_HEADER: &str = "x-accesso-device";

/// Identity extracted from a verified access token.
#[derive(Clone, Debug)]
pub(crate) struct AuthenticatedUser {
    pub(crate) user_id: Uuid,
    pub(crate) service_id: String,
}

/// Resolve the tenant from the request headers.
pub(crate) fn tenant_id(headers: &HeaderMap) -> Result<String, AuthError> {
    headers
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AuthError::BadRequest(format!("Missing {TENANT_HEADER} header")))
}

pub(crate) fn device_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(DEVICE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Client IP from proxy headers: first `x-forwarded-for` hop, else
/// `x-real-ip`.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Verify the bearer token against the tenant header and return the caller's
/// identity. The token audience must match the resolved tenant.
pub(crate) fn require_auth(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<AuthenticatedUser, AuthError> {
    let service_id = tenant_id(headers)?;
    let Some(token) = bearer_token(headers) else {
        return Err(AuthError::Unauthorized("Missing bearer token".to_string()));
    };

    let claims = state.signer().verify(token, &service_id)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AuthError::Unauthorized("Invalid token".to_string()))?;

    Ok(AuthenticatedUser {
        user_id,
        service_id,
    })
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

static EMAIL_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Cheap shape check; real validation is the verification email.
pub(crate) fn valid_email(email: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn tenant_header_is_required() {
        let mut headers = HeaderMap::new();
        assert!(tenant_id(&headers).is_err());

        headers.insert(TENANT_HEADER, HeaderValue::from_static("tenant-a"));
        assert_eq!(tenant_id(&headers).ok(), Some("tenant-a".to_string()));

        headers.insert(TENANT_HEADER, HeaderValue::from_static("   "));
        assert!(tenant_id(&headers).is_err());
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), Some("203.0.113.7".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), Some("10.0.0.2".to_string()));

        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn bearer_token_strips_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn email_shape_check() {
        assert!(valid_email("alice@example.com"));
        assert!(valid_email("a.b+c@sub.example.org"));
        assert!(!valid_email("alice"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("alice@"));
        assert!(!valid_email("alice@example"));
        assert!(!valid_email("alice@.com"));
        assert!(!valid_email("al ice@example.com"));
    }

    #[test]
    fn normalize_email_lowers_and_trims() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }
}
