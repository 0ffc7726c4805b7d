//! Face Gate - Error Types

use std::time::Duration;
use thiserror::Error;

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

// ═══════════════════════════════════════════════════════════════
// TENANT ERRORS
// ═══════════════════════════════════════════════════════════════

/// Organization (tenant) errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TenantError {
    #[error("Organization not found: {0}")]
    NotFound(String),

    #[error("Invalid organization name: {0:?}")]
    InvalidName(String),

    #[error("Organization name is reserved: {0}")]
    Reserved(String),
}

// ═══════════════════════════════════════════════════════════════
// CREDENTIAL ERRORS
// ═══════════════════════════════════════════════════════════════

/// Credential lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Active credential already exists for {owner}/{key_name} in {organization}")]
    Duplicate {
        organization: String,
        owner: String,
        key_name: String,
    },

    #[error("Invalid or expired credential")]
    InvalidSecret,

    #[error("Credential not found for {owner}/{key_name} in {organization}")]
    NotFound {
        organization: String,
        owner: String,
        key_name: String,
    },

    #[error("Secret hashing failed: {0}")]
    Hashing(String),
}

// ═══════════════════════════════════════════════════════════════
// PIPELINE ERRORS
// ═══════════════════════════════════════════════════════════════

/// Pipeline stage that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Detection,
    Embedding,
    Lookup,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Detection => f.write_str("detection"),
            Stage::Embedding => f.write_str("embedding"),
            Stage::Lookup => f.write_str("lookup"),
            Stage::Persist => f.write_str("persist"),
        }
    }
}

/// Per-item detection/embedding failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Face detection failed: {0}")]
    Detection(String),

    #[error("Embedding extraction failed: {0}")]
    Embedding(String),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("{stage} worker aborted: {message}")]
    Aborted { stage: Stage, message: String },
}

impl PipelineError {
    /// Stage the failure belongs to
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Detection(_) => Stage::Detection,
            PipelineError::Embedding(_) => Stage::Embedding,
            PipelineError::Timeout { stage, .. } | PipelineError::Aborted { stage, .. } => *stage,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// INDEX ERRORS
// ═══════════════════════════════════════════════════════════════

/// Vector index errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Vector index unavailable: {0}")]
    Unavailable(String),

    #[error("Vector index not provisioned for organization: {0}")]
    NotProvisioned(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

// ═══════════════════════════════════════════════════════════════
// CACHE ERRORS
// ═══════════════════════════════════════════════════════════════

/// Validation cache errors (never fatal)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Validation cache unavailable: {0}")]
    Unavailable(String),
}

// ═══════════════════════════════════════════════════════════════
// SERVICE ERROR
// ═══════════════════════════════════════════════════════════════

/// Top-level error surfaced to the transport layer
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Tenant(#[from] TenantError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed request: {0}")]
    BadRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Errors that reject the request as the caller's fault
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ServiceError::Tenant(_) | ServiceError::Credential(_) | ServiceError::BadRequest(_)
        )
    }

    /// Errors that end the in-flight request but leave stored state intact
    pub fn is_request_fatal(&self) -> bool {
        matches!(
            self,
            ServiceError::Index(_) | ServiceError::Database(_) | ServiceError::Pipeline(_)
        )
    }

    /// HTTP-style status hint for the transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Credential(CredentialError::InvalidSecret) => 403,
            ServiceError::Credential(CredentialError::NotFound { .. }) => 403,
            ServiceError::Credential(CredentialError::Hashing(_)) => 500,
            ServiceError::Credential(CredentialError::Duplicate { .. }) => 409,
            ServiceError::Tenant(TenantError::NotFound(_)) => 404,
            ServiceError::Tenant(_) | ServiceError::BadRequest(_) => 400,
            ServiceError::Index(_) | ServiceError::Pipeline(_) => 503,
            _ => 500,
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(e: rusqlite::Error) -> Self {
        ServiceError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::Serialization(e.to_string())
    }
}
