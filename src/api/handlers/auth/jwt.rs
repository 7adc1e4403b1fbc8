//! Short-lived access token signing and verification.
//!
//! Access tokens are HS256 JWTs carrying the account id, email, and tenant
//! (as audience). They are never persisted; only refresh tokens create
//! server-side state.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token audience does not match service")]
    WrongAudience,
    #[error("malformed token")]
    Malformed,
    #[error("failed to sign token")]
    Signing,
}

/// Claims payload for access tokens.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    /// Subject (account id)
    pub sub: String,
    pub email: String,
    /// Audience (tenant/service identifier)
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

pub struct TokenSigner {
    secret: SecretString,
    ttl_seconds: i64,
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: SecretString, ttl_seconds: i64) -> Self {
        Self {
            secret,
            ttl_seconds,
        }
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Sign an access token for the account.
    ///
    /// # Errors
    /// Returns [`TokenError::Signing`] if encoding fails.
    pub fn sign(&self, account_id: Uuid, email: &str, service_id: &str) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: account_id.to_string(),
            email: email.to_string(),
            aud: service_id.to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|_| TokenError::Signing)
    }

    /// Verify a token for the given tenant, distinguishing expired, malformed,
    /// and wrong-audience failures so the request layer can map them to 401
    /// variants.
    ///
    /// # Errors
    /// Returns the matching [`TokenError`] kind.
    pub fn verify(&self, token: &str, service_id: &str) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(&[service_id]);

        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidAudience => TokenError::WrongAudience,
            _ => TokenError::Malformed,
        })
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"***")
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{TokenError, TokenSigner};
    use secrecy::SecretString;
    use uuid::Uuid;

    fn signer() -> TokenSigner {
        TokenSigner::new(SecretString::from("test-secret"), 900)
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let signer = signer();
        let account_id = Uuid::new_v4();
        let token = signer.sign(account_id, "alice@example.com", "tenant-a");
        assert!(token.is_ok());
        if let Ok(token) = token {
            let claims = signer.verify(&token, "tenant-a");
            assert!(claims.is_ok());
            if let Ok(claims) = claims {
                assert_eq!(claims.sub, account_id.to_string());
                assert_eq!(claims.email, "alice@example.com");
                assert_eq!(claims.aud, "tenant-a");
                assert_eq!(claims.exp - claims.iat, 900);
            }
        }
    }

    #[test]
    fn wrong_audience_is_distinguished() {
        let signer = signer();
        let token = signer
            .sign(Uuid::new_v4(), "alice@example.com", "tenant-a")
            .ok();
        assert!(token.is_some());
        if let Some(token) = token {
            assert_eq!(
                signer.verify(&token, "tenant-b"),
                Err(TokenError::WrongAudience)
            );
        }
    }

    #[test]
    fn expired_token_is_distinguished() {
        let signer = TokenSigner::new(SecretString::from("test-secret"), -120);
        let token = signer
            .sign(Uuid::new_v4(), "alice@example.com", "tenant-a")
            .ok();
        assert!(token.is_some());
        if let Some(token) = token {
            assert_eq!(signer.verify(&token, "tenant-a"), Err(TokenError::Expired));
        }
    }

    #[test]
    fn garbage_is_malformed() {
        let signer = signer();
        assert_eq!(
            signer.verify("not-a-jwt", "tenant-a"),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn wrong_secret_is_malformed() {
        let signer = signer();
        let other = TokenSigner::new(SecretString::from("other-secret"), 900);
        let token = other
            .sign(Uuid::new_v4(), "alice@example.com", "tenant-a")
            .ok();
        assert!(token.is_some());
        if let Some(token) = token {
            assert_eq!(
                signer.verify(&token, "tenant-a"),
                Err(TokenError::Malformed)
            );
        }
    }

    #[test]
    fn debug_redacts_secret() {
        let out = format!("{:?}", signer());
        assert!(!out.contains("test-secret"));
        assert!(out.contains("***"));
    }
}
