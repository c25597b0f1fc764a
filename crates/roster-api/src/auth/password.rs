//! Password hashing and verification using PBKDF2-HMAC-SHA256
//!
//! Stored format is `base64(salt ++ key)`:
//! - Salt: 16 bytes from the OS RNG
//! - Key: 32 bytes
//! - Iterations: 100,000 by default
//!
//! The blob carries no parameters, so every hash in a deployment must use
//! the same iteration count.

use base64::{engine::general_purpose::STANDARD, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use roster_core::CredentialConfig;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

pub const SALT_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

/// Salted PBKDF2 hasher
#[derive(Debug, Clone, Copy)]
pub struct CredentialHasher {
    iterations: u32,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl From<&CredentialConfig> for CredentialHasher {
    fn from(config: &CredentialConfig) -> Self {
        Self::with_iterations(config.pbkdf2_iterations)
    }
}

impl CredentialHasher {
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn derive(&self, password: &str, salt: &[u8]) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, self.iterations, &mut key);
        key
    }

    /// Hash a plaintext password with a fresh random salt
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - base64 of the 16-byte salt followed by the 32-byte key
    /// * `Err(PasswordError)` - If the OS RNG is unavailable
    ///
    /// # Example
    ///
    /// ```
    /// use roster_api::auth::password::CredentialHasher;
    ///
    /// let hasher = CredentialHasher::with_iterations(1_000);
    /// let blob = hasher.hash("Passw0rd!").unwrap();
    /// assert!(hasher.verify("Passw0rd!", &blob).unwrap());
    /// ```
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

        let key = self.derive(password, &salt);

        let mut blob = Vec::with_capacity(SALT_LEN + KEY_LEN);
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&key);
        Ok(STANDARD.encode(blob))
    }

    /// Verify a plaintext password against a stored blob
    ///
    /// The key comparison is constant-time. A blob that is not base64 or
    /// not exactly 48 bytes yields [`PasswordError::InvalidHashFormat`];
    /// callers treat that the same as a mismatch.
    pub fn verify(&self, password: &str, blob: &str) -> Result<bool, PasswordError> {
        let bytes = STANDARD
            .decode(blob.trim())
            .map_err(|_| PasswordError::InvalidHashFormat)?;
        if bytes.len() != SALT_LEN + KEY_LEN {
            return Err(PasswordError::InvalidHashFormat);
        }

        let (salt, stored_key) = bytes.split_at(SALT_LEN);
        let candidate = self.derive(password, salt);
        Ok(candidate.ct_eq(stored_key).into())
    }

    /// Spend the same derivation cost as `verify` without a stored hash
    pub fn verify_dummy(&self, password: &str) {
        let _ = self.derive(password, &[0u8; SALT_LEN]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fast() -> CredentialHasher {
        CredentialHasher::with_iterations(1_000)
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = fast();
        let blob = hasher.hash("SecureP@ssw0rd!").unwrap();

        assert!(hasher.verify("SecureP@ssw0rd!", &blob).unwrap());
        assert!(!hasher.verify("WrongPassword", &blob).unwrap());
    }

    #[test]
    fn test_blob_layout() {
        let blob = fast().hash("x").unwrap();
        let bytes = STANDARD.decode(&blob).unwrap();
        assert_eq!(bytes.len(), 48);
    }

    #[test]
    fn test_same_password_different_hashes() {
        let hasher = fast();
        let first = hasher.hash("SamePassword123!").unwrap();
        let second = hasher.hash("SamePassword123!").unwrap();

        assert_ne!(first, second);
        assert!(hasher.verify("SamePassword123!", &first).unwrap());
        assert!(hasher.verify("SamePassword123!", &second).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        let hasher = fast();
        assert!(matches!(
            hasher.verify("password", "not!base64"),
            Err(PasswordError::InvalidHashFormat)
        ));
        assert!(matches!(
            hasher.verify("password", &STANDARD.encode([1u8; 20])),
            Err(PasswordError::InvalidHashFormat)
        ));
    }

    #[test]
    fn test_iteration_count_is_part_of_the_key() {
        let blob = CredentialHasher::with_iterations(1_000).hash("pw").unwrap();
        assert!(!CredentialHasher::with_iterations(1_001)
            .verify("pw", &blob)
            .unwrap());
    }

    #[test]
    fn test_known_vector() {
        // PBKDF2-HMAC-SHA256("password", "salt", c = 1) = 120fb6cf...
        let hasher = CredentialHasher::with_iterations(1);
        let key = hasher.derive("password", b"salt");
        assert_eq!(
            key[..4],
            [0x12, 0x0f, 0xb6, 0xcf],
            "unexpected derived key prefix"
        );
    }

    #[test]
    fn test_default_iterations() {
        assert_eq!(CredentialHasher::default().iterations(), 100_000);
        assert_eq!(
            CredentialHasher::from(&CredentialConfig::default()).iterations(),
            100_000
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_verify_accepts_only_the_original(p1 in ".{0,24}", p2 in ".{0,24}") {
            let hasher = CredentialHasher::with_iterations(10);
            let blob = hasher.hash(&p1).unwrap();
            prop_assert!(hasher.verify(&p1, &blob).unwrap());
            if p1 != p2 {
                prop_assert!(!hasher.verify(&p2, &blob).unwrap());
            }
        }
    }
}
