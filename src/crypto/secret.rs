//! Face Gate - Credential Secrets
//!
//! 256-bit random secrets, stored only as salted Argon2id PHC strings.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::CredentialError;

/// Secret length in bytes (256 bits)
pub const SECRET_LEN: usize = 32;

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// Argon2id cost parameters used when hashing new secrets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashingConfig {
    /// Memory in KiB
    pub memory_cost_kib: u32,
    /// Iterations
    pub time_cost: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_cost_kib: Params::DEFAULT_M_COST,
            time_cost: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl HashingConfig {
    /// Cheap parameters for tests and low-resource hosts
    pub fn fast() -> Self {
        Self {
            memory_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>, CredentialError> {
        let params = Params::new(self.memory_cost_kib, self.time_cost, self.parallelism, None)
            .map_err(|e| CredentialError::Hashing(format!("Invalid Argon2 params: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Generate a URL-safe random secret
pub fn generate_secret() -> SecretString {
    let mut bytes = [0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = URL_SAFE_NO_PAD.encode(bytes);
    bytes.zeroize();
    SecretString::new(encoded)
}

/// Hash a secret with a fresh random salt
pub fn hash_secret(secret: &str, config: &HashingConfig) -> Result<String, CredentialError> {
    let mut salt_bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| CredentialError::Hashing(e.to_string()))?;

    let hash = config
        .argon2()?
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| CredentialError::Hashing(e.to_string()))?;

    Ok(hash.to_string())
}

/// Constant-time check of a presented secret against a stored hash
///
/// Cost parameters are read from the PHC string, so hashes made under an
/// older `HashingConfig` keep verifying.
pub fn verify_secret(presented: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::error!("Stored credential hash is malformed: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(presented.as_bytes(), &parsed)
        .is_ok()
}
