//! Typed failure taxonomy for the auth core.
//!
//! Core operations classify failures by kind; the handlers map each kind to a
//! status code and a safe user-facing message. Internal errors are logged with
//! full detail and surfaced as a generic message.

use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong email/password or unknown account. Always the same message so
    /// callers cannot tell "no such user" from "wrong password".
    #[error("Invalid email or password")]
    InvalidCredentials,
    /// Missing or failed bearer authentication on a protected route. The
    /// message names the token failure kind (expired, wrong audience,
    /// malformed).
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Account is temporarily locked")]
    Locked,
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Locked => StatusCode::LOCKED,
            Self::InvalidOrExpiredToken | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the client.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<crate::api::handlers::auth::jwt::TokenError> for AuthError {
    fn from(err: crate::api::handlers::auth::jwt::TokenError) -> Self {
        use crate::api::handlers::auth::jwt::TokenError;
        match err {
            TokenError::Expired => Self::Unauthorized("Token expired".to_string()),
            TokenError::WrongAudience => {
                Self::Unauthorized("Token audience does not match service".to_string())
            }
            TokenError::Malformed => Self::Unauthorized("Invalid token".to_string()),
            TokenError::Signing => Self::Internal(anyhow::anyhow!("failed to sign token")),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        if let Self::Internal(err) = &self {
            error!("Internal error: {err:#}");
        }
        (self.status(), self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::AuthError;
    use axum::http::StatusCode;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            AuthError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Conflict("dup".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthError::Forbidden("nope".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AuthError::Locked.status(), StatusCode::LOCKED);
        assert_eq!(
            AuthError::InvalidOrExpiredToken.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::NotFound("gone".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AuthError::BadRequest("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn token_failures_map_to_unauthorized() {
        use crate::api::handlers::auth::jwt::TokenError;

        let err = AuthError::from(TokenError::Expired);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.public_message(), "Token expired");

        let err = AuthError::from(TokenError::WrongAudience);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = AuthError::from(TokenError::Malformed);
        assert_eq!(err.public_message(), "Invalid token");

        let err = AuthError::from(TokenError::Signing);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_credentials_message_is_uniform() {
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid email or password"
        );
    }

    #[test]
    fn internal_errors_never_leak_details() {
        let err = AuthError::Internal(anyhow::anyhow!("connection refused to 10.0.0.5"));
        assert_eq!(err.public_message(), "Internal error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn forbidden_carries_reason() {
        let err = AuthError::Forbidden("Account is linked to google".into());
        assert_eq!(err.public_message(), "Account is linked to google");
    }
}
