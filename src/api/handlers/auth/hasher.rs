//! Salted one-way password hashing with configurable cost.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

const LANES: u32 = 1;

/// Argon2id hasher with cost factors taken from configuration.
#[derive(Clone, Debug)]
pub struct Hasher {
    memory_kib: u32,
    iterations: u32,
}

impl Hasher {
    #[must_use]
    pub fn new(memory_kib: u32, iterations: u32) -> Self {
        Self {
            memory_kib,
            iterations,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, LANES, None)
            .map_err(|e| anyhow!("invalid argon2 params: {e}"))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a plaintext password. Empty strings hash like any other input.
    ///
    /// # Errors
    /// Returns an error if the hash parameters are invalid.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow!("failed to hash password: {e}"))
    }

    /// Verify a plaintext password against a stored hash.
    ///
    /// A `None` hash returns `false` immediately without touching the hasher:
    /// this is the gate that makes OAuth-only accounts fail password login.
    #[must_use]
    pub fn verify(&self, stored: Option<&str>, password: &str) -> bool {
        let Some(stored) = stored else {
            return false;
        };
        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::Hasher;

    // Small costs keep tests fast; production values come from configuration.
    fn test_hasher() -> Hasher {
        Hasher::new(8, 1)
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hasher = test_hasher();
        let hash = hasher.hash("Passw0rd!").ok();
        assert!(hash.is_some());
        if let Some(hash) = hash {
            assert!(hasher.verify(Some(&hash), "Passw0rd!"));
            assert!(!hasher.verify(Some(&hash), "wrong"));
        }
    }

    #[test]
    fn none_hash_never_verifies() {
        let hasher = test_hasher();
        assert!(!hasher.verify(None, "anything"));
        assert!(!hasher.verify(None, ""));
    }

    #[test]
    fn empty_password_hashes_like_any_other() {
        let hasher = test_hasher();
        let hash = hasher.hash("").ok();
        assert!(hash.is_some());
        if let Some(hash) = hash {
            assert!(hasher.verify(Some(&hash), ""));
            assert!(!hasher.verify(Some(&hash), "not-empty"));
        }
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = test_hasher();
        let first = hasher.hash("same-input").ok();
        let second = hasher.hash("same-input").ok();
        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn garbage_stored_hash_fails_closed() {
        let hasher = test_hasher();
        assert!(!hasher.verify(Some("not-a-phc-string"), "Passw0rd!"));
    }
}
