//! Face Gate - Storage Interfaces
//!
//! Narrow capability traits for the durable credential store and the
//! tenant-scoped embedding index. `SqliteStore` implements both.

mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{IndexError, ServiceResult};
use crate::model::{Credential, CredentialKey, Embedding, NearestMatch};

/// Namespaces hidden from organization listings
pub const DEFAULT_RESERVED_ORGANIZATIONS: &[&str] = &["admin", "local", "config"];

/// Durable, tenant-scoped credential storage
pub trait CredentialStore: Send + Sync {
    /// Idempotent; `true` whether newly created or already present
    fn create_organization(&self, name: &str) -> ServiceResult<bool>;

    fn organization_exists(&self, name: &str) -> ServiceResult<bool>;

    /// All organizations except reserved namespaces
    fn list_organizations(&self) -> ServiceResult<BTreeSet<String>>;

    /// Active credential for the identity tuple
    fn find_credential(&self, key: &CredentialKey) -> ServiceResult<Option<Credential>>;

    /// Insert a new credential.
    ///
    /// Fails with `TenantError::NotFound` if the organization is missing and
    /// `CredentialError::Duplicate` if an active credential already holds the
    /// identity tuple. Of two concurrent inserts for the same tuple exactly
    /// one succeeds.
    fn insert_credential(&self, credential: &Credential) -> ServiceResult<()>;

    /// Record a successful use
    fn touch_credential(&self, key: &CredentialKey, at: DateTime<Utc>) -> ServiceResult<()>;

    /// Remove the credential; `false` if nothing was deleted
    fn delete_credential(&self, key: &CredentialKey) -> ServiceResult<bool>;

    /// Delete one specific credential record. `false` if it is already gone.
    fn delete_credential_by_id(&self, id: &Uuid) -> ServiceResult<bool>;

    /// Active credentials of an organization
    fn list_credentials(&self, organization: &str) -> ServiceResult<Vec<Credential>>;
}

/// Tenant-scoped nearest-neighbour index
pub trait EmbeddingIndex: Send + Sync {
    /// Store one embedding for `identity` in `organization`
    fn upsert_embedding(
        &self,
        identity: &str,
        organization: &str,
        embedding: &Embedding,
    ) -> Result<(), IndexError>;

    /// Store a batch; either every embedding is written or none is
    fn upsert_embeddings(
        &self,
        identity: &str,
        organization: &str,
        embeddings: &[Embedding],
    ) -> Result<usize, IndexError> {
        for embedding in embeddings {
            self.upsert_embedding(identity, organization, embedding)?;
        }
        Ok(embeddings.len())
    }

    /// Closest stored embedding and its similarity, `None` on an empty index
    fn query_nearest(
        &self,
        organization: &str,
        embedding: &Embedding,
    ) -> Result<Option<NearestMatch>, IndexError>;

    fn count_embeddings(&self, organization: &str) -> Result<usize, IndexError>;
}
