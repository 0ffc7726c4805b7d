//! Face Gate - Cache Fingerprints
//!
//! Keyed digest of (organization, owner, key name, presented secret) so the
//! validation cache never holds a plaintext secret.

use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;

use crate::model::CredentialKey;

type HmacSha256 = Hmac<Sha256>;

/// Fingerprint key length
pub const FINGERPRINT_KEY_LEN: usize = 32;

/// Process-local HMAC key for cache fingerprints
pub struct Fingerprinter {
    key: Secret<[u8; FINGERPRINT_KEY_LEN]>,
}

impl Fingerprinter {
    pub fn new(key: [u8; FINGERPRINT_KEY_LEN]) -> Self {
        Self {
            key: Secret::new(key),
        }
    }

    /// Random key; fingerprints are only comparable within this instance
    pub fn generate() -> Self {
        let mut key = [0u8; FINGERPRINT_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(key)
    }

    /// Hex fingerprint for a presented credential
    pub fn fingerprint(&self, key: &CredentialKey, presented_secret: &str) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.key.expose_secret())
            .expect("HMAC accepts keys of any length");

        // Length-prefix each field so ("ab","c") and ("a","bc") differ
        for part in [
            key.organization.as_str(),
            key.owner.as_str(),
            key.key_name.as_str(),
            presented_secret,
        ] {
            mac.update(&(part.len() as u64).to_be_bytes());
            mac.update(part.as_bytes());
        }

        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Fingerprinter([REDACTED])")
    }
}
