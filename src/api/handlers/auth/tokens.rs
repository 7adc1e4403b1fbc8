//! Opaque token generation and one-way storage digests.
//!
//! Verification, reset, and refresh tokens are random strings handed to the
//! client exactly once. The database only stores a deterministic SHA-256
//! digest so incoming tokens can be looked up by re-hashing. Passwords never
//! go through this path; they use the salted hasher instead.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// Create a new opaque token. The raw value is only returned to the caller;
/// storage keeps the digest from [`hash_token`].
pub(crate) fn generate_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Deterministic storage digest for an opaque token.
pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    #[test]
    fn generate_token_is_32_random_bytes() {
        let decoded_len = generate_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn generate_token_unique_per_call() {
        let first = generate_token().ok();
        let second = generate_token().ok();
        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn hash_token_deterministic() {
        let first = hash_token("token");
        let second = hash_token("token");
        let different = hash_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn digest_never_equals_plaintext() {
        // Stored value must never match what the client holds.
        let token = generate_token().unwrap_or_else(|_| "fallback".to_string());
        let digest = hash_token(&token);
        assert_ne!(digest, token.as_bytes());
        assert_eq!(digest.len(), 32);
    }
}
