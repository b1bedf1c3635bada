//! API Key Service
//!
//! Key generation, format checks, and credential validation.
//!
//! # Key Format
//!
//! ```text
//! <64 lowercase hex chars>  (256 bits of entropy from the OS CSPRNG)
//! ```
//!
//! The first 8 characters are stored alongside the hash as the lookup
//! prefix. Prefixes are not unique: validation fetches every enabled key
//! sharing the prefix and verifies the secret against each candidate.

use rand::rngs::OsRng;
use rand::RngCore;
use shared::models::PermissionSet;
use shared::{Error, Result};
use tracing::{debug, warn};

use crate::repositories::ApiKeyStore;
use crate::services::secret_hasher::SecretHasher;

/// Length of random bytes for key generation (256 bits of entropy)
const KEY_ENTROPY_BYTES: usize = 32;

/// Full key length in hex characters
const KEY_LENGTH: usize = KEY_ENTROPY_BYTES * 2;

/// Length of the stored prefix (for database lookup)
const PREFIX_LENGTH: usize = 8;

/// Result of generating a new API key
#[derive(Debug)]
pub struct GeneratedKey {
    /// The full plaintext key (to be shown to the user ONLY ONCE)
    pub key: String,

    /// The Argon2id hash of the key (to be stored in the database)
    pub hash: String,

    /// The prefix for database lookup (first 8 chars of the key)
    pub prefix: String,
}

/// Why a presented key was rejected
///
/// All variants surface to clients as the same 401; the distinction exists
/// for server-side logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRejection {
    /// Not a 64-char hex string
    Malformed,
    /// No stored key matched (unknown, disabled, or wrong secret)
    InvalidKey,
    /// Matched a stored key whose expiry has passed
    Expired,
}

impl KeyRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRejection::Malformed => "malformed",
            KeyRejection::InvalidKey => "invalid_key",
            KeyRejection::Expired => "expired",
        }
    }
}

/// Outcome of validating a presented API key
#[derive(Debug, Clone)]
pub enum KeyValidation {
    Valid {
        key_id: i64,
        user_id: i64,
        permissions: PermissionSet,
    },
    Invalid(KeyRejection),
}

/// Service for API key generation and validation
#[derive(Clone)]
pub struct ApiKeyService {
    hasher: SecretHasher,
}

impl Default for ApiKeyService {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiKeyService {
    pub fn new() -> Self {
        Self {
            hasher: SecretHasher::new(),
        }
    }

    /// Build a service around an existing hasher (tests use reduced cost)
    pub fn with_hasher(hasher: SecretHasher) -> Self {
        Self { hasher }
    }

    pub fn hasher(&self) -> &SecretHasher {
        &self.hasher
    }

    /// Generate a new API key with secure random entropy
    ///
    /// Uses `OsRng` (OS-provided CSPRNG) for the 32 random bytes. The
    /// returned plaintext exists only in the returned struct; callers must
    /// not log or persist it.
    pub fn generate(&self) -> Result<GeneratedKey> {
        let mut random_bytes = [0u8; KEY_ENTROPY_BYTES];
        OsRng
            .try_fill_bytes(&mut random_bytes)
            .map_err(|e| Error::internal(format!("CSPRNG failure: {}", e)))?;

        let key = hex::encode(random_bytes);
        let prefix = key[..PREFIX_LENGTH].to_string();
        let hash = self
            .hasher
            .hash(&key)
            .map_err(|e| Error::internal(e.to_string()))?;

        Ok(GeneratedKey { key, hash, prefix })
    }

    /// Check that a presented key has the expected shape
    pub fn is_valid_format(key: &str) -> bool {
        key.len() == KEY_LENGTH && key.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Extract the lookup prefix from a full key
    pub fn extract_prefix(key: &str) -> Result<&str> {
        if key.len() < PREFIX_LENGTH {
            return Err(Error::validation("API key too short"));
        }
        Ok(&key[..PREFIX_LENGTH])
    }

    /// Validate a presented key against the store
    ///
    /// The work performed is the same whether or not the prefix exists:
    /// when the lookup returns no candidates a dummy verification burns an
    /// equivalent Argon2 budget, so timing does not reveal which prefixes
    /// are present.
    pub async fn validate(&self, store: &dyn ApiKeyStore, raw_key: &str) -> Result<KeyValidation> {
        if !Self::is_valid_format(raw_key) {
            return Ok(KeyValidation::Invalid(KeyRejection::Malformed));
        }

        let prefix = Self::extract_prefix(raw_key)?;
        let candidates = store.find_enabled_by_prefix(prefix).await?;

        if candidates.is_empty() {
            self.hasher.dummy_verify();
            return Ok(KeyValidation::Invalid(KeyRejection::InvalidKey));
        }

        for candidate in &candidates {
            match self.hasher.verify(raw_key, &candidate.key_hash) {
                Ok(true) => {
                    if candidate.is_expired() {
                        debug!(key_id = candidate.id, "Rejected expired API key");
                        return Ok(KeyValidation::Invalid(KeyRejection::Expired));
                    }

                    return Ok(KeyValidation::Valid {
                        key_id: candidate.id,
                        user_id: candidate.user_id,
                        permissions: candidate.permissions,
                    });
                }
                Ok(false) => continue,
                Err(e) => {
                    // A corrupt stored hash must not grant or deny other
                    // candidates; log and keep going.
                    warn!(key_id = candidate.id, error = %e, "Stored key hash failed to parse");
                    continue;
                }
            }
        }

        Ok(KeyValidation::Invalid(KeyRejection::InvalidKey))
    }
}
