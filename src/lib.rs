//! # Face Gate
//!
//! Tenant-scoped API credentials guarding face registration and recognition.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        FACE GATE                         │
//! │  ┌──────────────────────────────────────────────────┐    │
//! │  │        FaceService (api)  /  RecognitionSession   │    │
//! │  └──────┬──────────────────┬────────────────┬────────┘    │
//! │         │                  │                │             │
//! │  ┌──────┴──────┐  ┌────────┴──────┐  ┌──────┴────────┐    │
//! │  │ CREDENTIAL  │  │ REGISTRATION  │  │ RECOGNITION   │    │
//! │  │ VALIDATOR   │  │ ORCHESTRATOR  │  │ ORCHESTRATOR  │    │
//! │  └──┬───────┬──┘  └────────┬──────┘  └──────┬────────┘    │
//! │     │       │              └──────┬─────────┘             │
//! │  ┌──┴────┐ ┌┴─────────────┐  ┌────┴──────────────────┐    │
//! │  │ CACHE │ │ SQLITE STORE │  │ PIPELINE RUNNER       │    │
//! │  │ (TTL) │ │ creds + index│  │ detector / embedder   │    │
//! │  └───────┘ └──────────────┘  └───────────────────────┘    │
//! │                                                           │
//! │             ResultRedactor on every outbound result       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Secrets are 256-bit random values returned once at issuance
//! - Only Argon2id hashes are stored
//! - Cache keys are HMAC fingerprints, never plaintext
//! - Raw face crops never leave the service

pub mod api;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod recognition;
pub mod redact;
pub mod registration;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use api::{ApiAuth, FaceService};
pub use cache::{MemoryCache, ValidationCache};
pub use config::ServiceConfig;
pub use credentials::CredentialValidator;
pub use error::{ServiceError, ServiceResult};
pub use pipeline::{Detector, Embedder};
pub use recognition::RecognitionOrchestrator;
pub use redact::ResultRedactor;
pub use registration::{RegistrationOrchestrator, RegistrationReport};
pub use session::RecognitionSession;
pub use store::{CredentialStore, EmbeddingIndex, SqliteStore};

/// Face Gate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
