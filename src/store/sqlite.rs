//! Face Gate - SQLite Store
//!
//! Organizations, hashed credentials and embeddings in one SQLite database.
//! Similarity search is an exhaustive cosine scan over the tenant's rows.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use uuid::Uuid;

use super::{CredentialStore, EmbeddingIndex, DEFAULT_RESERVED_ORGANIZATIONS};
use crate::error::{CredentialError, IndexError, ServiceError, ServiceResult, TenantError};
use crate::model::{cosine_similarity, Credential, CredentialKey, Embedding, NearestMatch};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS organizations (
        name TEXT PRIMARY KEY,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS credentials (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        owner TEXT NOT NULL,
        key_name TEXT NOT NULL,
        secret_hash TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_used_at TEXT,
        active INTEGER NOT NULL DEFAULT 1
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_active_credential
        ON credentials(organization, owner, key_name) WHERE active = 1;

    CREATE TABLE IF NOT EXISTS embeddings (
        id TEXT PRIMARY KEY,
        organization TEXT NOT NULL,
        identity TEXT NOT NULL,
        dim INTEGER NOT NULL,
        vector BLOB NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_embeddings_org ON embeddings(organization);
"#;

/// SQLite-backed credential store and embedding index
pub struct SqliteStore {
    /// Database connection
    conn: Mutex<Connection>,
    /// Expected embedding length
    embedding_dim: usize,
    /// Names hidden from listings
    reserved: Vec<String>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`; `:memory:` is in-memory
    pub fn open(path: &Path, embedding_dim: usize) -> ServiceResult<Self> {
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open(path)?
        };
        Self::with_connection(conn, embedding_dim)
    }

    /// Fresh in-memory database
    pub fn open_in_memory(embedding_dim: usize) -> ServiceResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, embedding_dim)
    }

    fn with_connection(conn: Connection, embedding_dim: usize) -> ServiceResult<Self> {
        conn.execute_batch(SCHEMA)?;
        log::debug!("SQLite store ready (embedding dim {})", embedding_dim);

        Ok(Self {
            conn: Mutex::new(conn),
            embedding_dim,
            reserved: DEFAULT_RESERVED_ORGANIZATIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        })
    }

    /// Replace the reserved namespace list
    pub fn with_reserved(mut self, reserved: Vec<String>) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn check_dim(&self, embedding: &Embedding) -> Result<(), IndexError> {
        if embedding.dim() != self.embedding_dim {
            return Err(IndexError::DimensionMismatch {
                expected: self.embedding_dim,
                actual: embedding.dim(),
            });
        }
        Ok(())
    }

    fn org_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT 1 FROM organizations WHERE name = ?1",
            params![name],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
    }

    fn row_to_credential(row: &rusqlite::Row<'_>) -> rusqlite::Result<Credential> {
        let id: String = row.get(0)?;
        let created_at: String = row.get(5)?;
        let last_used_at: Option<String> = row.get(6)?;
        let active: i64 = row.get(7)?;

        Ok(Credential {
            id: Uuid::parse_str(&id)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
            organization: row.get(1)?,
            owner: row.get(2)?,
            key_name: row.get(3)?,
            secret_hash: row.get(4)?,
            created_at: parse_ts(5, &created_at)?,
            last_used_at: last_used_at.map(|s| parse_ts(6, &s)).transpose()?,
            active: active != 0,
        })
    }
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn index_err(e: rusqlite::Error) -> IndexError {
    IndexError::Unavailable(e.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CREDENTIAL STORE
// ═══════════════════════════════════════════════════════════════════════════════

impl CredentialStore for SqliteStore {
    fn create_organization(&self, name: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO organizations (name, created_at) VALUES (?1, ?2)",
            params![name, Utc::now().to_rfc3339()],
        )?;

        if inserted == 0 {
            log::info!("Organization '{}' already exists", name);
        } else {
            log::info!("Organization '{}' created", name);
        }
        Ok(true)
    }

    fn organization_exists(&self, name: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock();
        Ok(Self::org_exists(&conn, name)?)
    }

    fn list_organizations(&self) -> ServiceResult<BTreeSet<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM organizations")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut names = BTreeSet::new();
        for name in rows {
            let name = name?;
            if !self.reserved.iter().any(|r| r == &name) {
                names.insert(name);
            }
        }
        Ok(names)
    }

    fn find_credential(&self, key: &CredentialKey) -> ServiceResult<Option<Credential>> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT id, organization, owner, key_name, secret_hash, created_at, last_used_at, active
                 FROM credentials
                 WHERE organization = ?1 AND owner = ?2 AND key_name = ?3 AND active = 1",
                params![key.organization, key.owner, key.key_name],
                Self::row_to_credential,
            )
            .optional()?;
        Ok(found)
    }

    fn insert_credential(&self, credential: &Credential) -> ServiceResult<()> {
        let conn = self.conn.lock();

        if !Self::org_exists(&conn, &credential.organization)? {
            return Err(TenantError::NotFound(credential.organization.clone()).into());
        }

        let result = conn.execute(
            "INSERT INTO credentials
                (id, organization, owner, key_name, secret_hash, created_at, last_used_at, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                credential.id.to_string(),
                credential.organization,
                credential.owner,
                credential.key_name,
                credential.secret_hash,
                credential.created_at.to_rfc3339(),
                credential.last_used_at.map(|t| t.to_rfc3339()),
                credential.active as i64,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(CredentialError::Duplicate {
                organization: credential.organization.clone(),
                owner: credential.owner.clone(),
                key_name: credential.key_name.clone(),
            }
            .into()),
            Err(e) => Err(ServiceError::from(e)),
        }
    }

    fn touch_credential(&self, key: &CredentialKey, at: DateTime<Utc>) -> ServiceResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE credentials SET last_used_at = ?4
             WHERE organization = ?1 AND owner = ?2 AND key_name = ?3 AND active = 1",
            params![key.organization, key.owner, key.key_name, at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn delete_credential(&self, key: &CredentialKey) -> ServiceResult<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM credentials WHERE organization = ?1 AND owner = ?2 AND key_name = ?3",
            params![key.organization, key.owner, key.key_name],
        )?;
        Ok(deleted > 0)
    }

    fn delete_credential_by_id(&self, id: &Uuid) -> ServiceResult<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM credentials WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    fn list_credentials(&self, organization: &str) -> ServiceResult<Vec<Credential>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, organization, owner, key_name, secret_hash, created_at, last_used_at, active
             FROM credentials
             WHERE organization = ?1 AND active = 1
             ORDER BY owner, key_name",
        )?;
        let rows = stmt.query_map(params![organization], Self::row_to_credential)?;

        let mut credentials = Vec::new();
        for row in rows {
            credentials.push(row?);
        }
        Ok(credentials)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EMBEDDING INDEX
// ═══════════════════════════════════════════════════════════════════════════════

impl EmbeddingIndex for SqliteStore {
    fn upsert_embedding(
        &self,
        identity: &str,
        organization: &str,
        embedding: &Embedding,
    ) -> Result<(), IndexError> {
        self.upsert_embeddings(identity, organization, std::slice::from_ref(embedding))
            .map(|_| ())
    }

    fn upsert_embeddings(
        &self,
        identity: &str,
        organization: &str,
        embeddings: &[Embedding],
    ) -> Result<usize, IndexError> {
        for embedding in embeddings {
            self.check_dim(embedding)?;
        }

        let mut conn = self.conn.lock();
        if !Self::org_exists(&conn, organization).map_err(index_err)? {
            return Err(IndexError::NotProvisioned(organization.to_string()));
        }

        let tx = conn.transaction().map_err(index_err)?;
        let now = Utc::now().to_rfc3339();
        for embedding in embeddings {
            let blob = bincode::serialize(&embedding.vector)
                .map_err(|e| IndexError::Unavailable(e.to_string()))?;
            tx.execute(
                "INSERT INTO embeddings (id, organization, identity, dim, vector, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    organization,
                    identity,
                    embedding.dim() as i64,
                    blob,
                    now,
                ],
            )
            .map_err(index_err)?;
        }
        tx.commit().map_err(index_err)?;

        log::debug!(
            "Stored {} embedding(s) for '{}' in '{}'",
            embeddings.len(),
            identity,
            organization
        );
        Ok(embeddings.len())
    }

    fn query_nearest(
        &self,
        organization: &str,
        embedding: &Embedding,
    ) -> Result<Option<NearestMatch>, IndexError> {
        self.check_dim(embedding)?;

        // Copy the rows out so the connection is free during scoring
        let rows = {
            let conn = self.conn.lock();
            if !Self::org_exists(&conn, organization).map_err(index_err)? {
                return Err(IndexError::NotProvisioned(organization.to_string()));
            }

            let mut stmt = conn
                .prepare("SELECT identity, vector FROM embeddings WHERE organization = ?1")
                .map_err(index_err)?;
            let rows: Vec<(String, Vec<u8>)> = stmt
                .query_map(params![organization], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                })
                .map_err(index_err)?
                .collect::<Result<_, _>>()
                .map_err(index_err)?;
            rows
        };

        let mut best: Option<NearestMatch> = None;
        for (identity, blob) in rows {
            let stored: Vec<f32> = match bincode::deserialize(&blob) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("Skipping corrupt embedding for '{}': {}", identity, e);
                    continue;
                }
            };

            let score = cosine_similarity(&embedding.vector, &stored);
            if best.as_ref().map_or(true, |b| score > b.score) {
                best = Some(NearestMatch { identity, score });
            }
        }

        Ok(best)
    }

    fn count_embeddings(&self, organization: &str) -> Result<usize, IndexError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM embeddings WHERE organization = ?1",
                params![organization],
                |row| row.get(0),
            )
            .map_err(index_err)?;
        Ok(count as usize)
    }
}
