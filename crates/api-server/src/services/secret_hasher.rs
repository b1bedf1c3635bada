//! Secret Hasher
//!
//! Argon2id hashing and verification for API keys and passwords.
//!
//! # Security Properties
//!
//! - **Argon2id**: OWASP-recommended parameters (64 MiB memory, 3 iterations)
//! - **Random salt per hash**: the same secret never produces the same hash
//! - **Constant-time verification**: Argon2 verify is timing-attack resistant
//! - **Dummy verification**: callers can burn an equivalent amount of work when
//!   no stored hash exists, so lookup misses are not observable via timing

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use once_cell::sync::Lazy;
use thiserror::Error;

/// Argon2 memory cost in KiB (64 MiB as per OWASP recommendations)
const ARGON2_MEMORY_COST: u32 = 65536;

/// Argon2 time cost (iterations)
const ARGON2_TIME_COST: u32 = 3;

/// Argon2 parallelism degree
const ARGON2_PARALLELISM: u32 = 1;

/// Dummy secret used for timing attack mitigation
const DUMMY_SECRET: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Pre-computed dummy hash for timing attack mitigation
///
/// Computed once per process so every dummy_verify() call performs a full
/// Argon2 verification against a valid PHC string with consistent timing.
static DUMMY_HASH: Lazy<String> = Lazy::new(|| {
    let params = Params::new(
        ARGON2_MEMORY_COST,
        ARGON2_TIME_COST,
        ARGON2_PARALLELISM,
        None,
    )
    .expect("Invalid Argon2 parameters");

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);

    argon2
        .hash_password(DUMMY_SECRET.as_bytes(), &salt)
        .expect("Failed to pre-compute dummy hash")
        .to_string()
});

/// Errors that can occur during hashing operations
#[derive(Debug, Error)]
pub enum HasherError {
    #[error("Failed to hash secret: {0}")]
    HashError(String),

    #[error("Failed to verify secret: {0}")]
    VerificationError(String),
}

/// Argon2id hasher for API keys and passwords
#[derive(Clone)]
pub struct SecretHasher {
    argon2: Argon2<'static>,
}

impl Default for SecretHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretHasher {
    /// Create a hasher with OWASP-recommended Argon2 parameters
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY_COST,
            ARGON2_TIME_COST,
            ARGON2_PARALLELISM,
            None, // Default output length (32 bytes)
        )
        .expect("Invalid Argon2 parameters");

        Self {
            argon2: Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params),
        }
    }

    /// Create a hasher with explicit cost parameters
    ///
    /// Intended for tests, where the production memory cost makes every
    /// hash take hundreds of milliseconds. Production code paths use
    /// [`SecretHasher::new`].
    pub fn with_cost(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .expect("Invalid Argon2 parameters");

        Self {
            argon2: Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params),
        }
    }

    /// Hash a secret using Argon2id with a fresh random salt
    ///
    /// Returns the hash in PHC string format.
    pub fn hash(&self, secret: &str) -> Result<String, HasherError> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| HasherError::HashError(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify a secret against a stored PHC hash
    ///
    /// Returns `Ok(false)` for a mismatch; errors only for malformed hashes.
    pub fn verify(&self, secret: &str, hash: &str) -> Result<bool, HasherError> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| HasherError::VerificationError(e.to_string()))?;

        match self.argon2.verify_password(secret.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HasherError::VerificationError(e.to_string())),
        }
    }

    /// Perform a full verification against the pre-computed dummy hash
    ///
    /// Called when a key prefix matches no stored record, so the response
    /// time is indistinguishable from a real verification failure.
    pub fn dummy_verify(&self) {
        let _ = self.verify(DUMMY_SECRET, &DUMMY_HASH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> SecretHasher {
        SecretHasher::with_cost(1024, 1, 1)
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = fast_hasher();
        let hash = hasher.hash("my-secret").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("my-secret", &hash).unwrap());
        assert!(!hasher.verify("wrong-secret", &hash).unwrap());
    }

    #[test]
    fn test_same_secret_different_hashes() {
        let hasher = fast_hasher();

        let hash1 = hasher.hash("secret").unwrap();
        let hash2 = hasher.hash("secret").unwrap();

        // Different salts
        assert_ne!(hash1, hash2);
        assert!(hasher.verify("secret", &hash1).unwrap());
        assert!(hasher.verify("secret", &hash2).unwrap());
    }

    #[test]
    fn test_verify_malformed_hash_errors() {
        let hasher = fast_hasher();
        assert!(hasher.verify("secret", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_production_hash_contains_params() {
        let hasher = SecretHasher::new();
        let hash = hasher.hash("secret").unwrap();

        assert!(hash.contains("argon2id"));
        assert!(hash.contains("m=65536"));
        assert!(hash.contains("t=3"));
        assert!(hash.contains("p=1"));
    }

    #[test]
    fn test_dummy_verify_does_not_panic() {
        SecretHasher::new().dummy_verify();
    }
}
