//! Face Gate - Service Configuration
//!
//! Built once at startup and handed to `FaceService::new`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::HashingConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::model::DEFAULT_EMBEDDING_DIM;
use crate::store::DEFAULT_RESERVED_ORGANIZATIONS;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// SQLite database file (`:memory:` for a throwaway store)
    pub database_path: PathBuf,
    /// Validation cache entry lifetime
    pub cache_ttl_secs: u64,
    /// Detections at or below this confidence are not enrolled
    pub min_face_confidence: f32,
    /// Embedding length expected from the embedder
    pub embedding_dim: usize,
    /// Threshold for streaming messages that omit one
    pub default_threshold: f32,
    /// Upper bound on a single detector/embedder call
    pub collaborator_timeout_ms: u64,
    /// Evict the revoking caller's cache entry on revoke
    pub evict_on_revoke: bool,
    /// Names that cannot be created and are hidden from listings
    pub reserved_organizations: Vec<String>,
    /// Argon2id parameters for new credentials
    pub hashing: HashingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./face_gate.db"),
            cache_ttl_secs: 3600, // 1 hour
            min_face_confidence: 0.7,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            default_threshold: 0.5,
            collaborator_timeout_ms: 30_000,
            evict_on_revoke: false,
            reserved_organizations: DEFAULT_RESERVED_ORGANIZATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            hashing: HashingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// In-memory store with cheap hashing
    pub fn ephemeral() -> Self {
        Self {
            database_path: PathBuf::from(":memory:"),
            hashing: HashingConfig::fast(),
            ..Default::default()
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> ServiceResult<()> {
        if self.embedding_dim == 0 {
            return Err(ServiceError::Config("embedding_dim must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.min_face_confidence) {
            return Err(ServiceError::Config(format!(
                "min_face_confidence out of range: {}",
                self.min_face_confidence
            )));
        }
        if self.collaborator_timeout_ms == 0 {
            return Err(ServiceError::Config(
                "collaborator_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Load from a JSON file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> ServiceResult<Self> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)
            .map_err(|e| ServiceError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> ServiceResult<()> {
        let data = serde_json::to_vec_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, data)?;
        Ok(())
    }
}
