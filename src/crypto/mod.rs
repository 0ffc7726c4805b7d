//! Face Gate - Credential Cryptography
//!
//! Secret generation, salted Argon2id hashing and cache fingerprints.

pub mod secret;
pub mod fingerprint;

pub use secret::*;
pub use fingerprint::*;
