//! Face Gate - Public API
//!
//! Single entry point for transport layers. Every credential-guarded call
//! checks the organization, authenticates the caller, runs the orchestrator
//! and redacts the result before it is returned.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::MemoryCache;
use crate::config::ServiceConfig;
use crate::credentials::{CredentialValidator, ValidatorSettings};
use crate::error::{ServiceError, ServiceResult, TenantError};
use crate::model::Credential;
use crate::pipeline::{Detector, Embedder, PipelineRunner};
use crate::recognition::RecognitionOrchestrator;
use crate::redact::ResultRedactor;
use crate::registration::{RegistrationOrchestrator, RegistrationReport};
use crate::session::RecognitionSession;
use crate::store::{CredentialStore, EmbeddingIndex, SqliteStore};

/// Longest accepted organization name
pub const MAX_ORGANIZATION_NAME: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSPORT PAYLOADS
// ═══════════════════════════════════════════════════════════════════════════════

/// Credential identity sent alongside a bearer secret
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiAuth {
    pub owner: String,
    pub key_name: String,
}

impl ApiAuth {
    pub fn new(owner: &str, key_name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            key_name: key_name.to_string(),
        }
    }
}

/// Issue-credential request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCredentialRequest {
    pub owner: String,
    pub key_name: String,
}

/// Issue-credential response; the only place the plaintext secret appears
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCredentialResponse {
    pub secret: String,
    pub owner: String,
    pub key_name: String,
    pub organization: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedCredentialResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredentialResponse")
            .field("secret", &"[REDACTED]")
            .field("owner", &self.owner)
            .field("key_name", &self.key_name)
            .field("organization", &self.organization)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Revoke request (secret travels as bearer)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    pub owner: String,
    pub key_name: String,
}

/// Register request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub images: Vec<String>,
    pub identity_name: String,
    pub api_auth: ApiAuth,
}

/// Single-shot recognize request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeRequest {
    pub image: String,
    pub threshold: f32,
    pub api_auth: ApiAuth,
}

/// Boolean-style response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
        }
    }
}

/// Check an organization name before creation
pub fn validate_organization_name(name: &str, reserved: &[String]) -> Result<(), TenantError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_ORGANIZATION_NAME
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(TenantError::InvalidName(name.to_string()));
    }
    if reserved.iter().any(|r| r.eq_ignore_ascii_case(name)) {
        return Err(TenantError::Reserved(name.to_string()));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// FACE SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

/// Face Gate service facade
///
/// # Example
///
/// ```rust,ignore
/// let service = FaceService::new(ServiceConfig::default(), detector, embedder)?;
/// service.create_organization("acme")?;
///
/// let issued = service.issue_credential("acme", IssueCredentialRequest { .. }).await?;
/// let result = service.recognize("acme", request, &issued.secret).await?;
/// ```
pub struct FaceService {
    config: ServiceConfig,
    store: Arc<SqliteStore>,
    validator: Arc<CredentialValidator>,
    runner: Arc<PipelineRunner>,
    registration: RegistrationOrchestrator,
    recognition: Arc<RecognitionOrchestrator>,
    redactor: ResultRedactor,
}

impl FaceService {
    // ═══════════════════════════════════════════════════════════════════════
    // INITIALIZATION
    // ═══════════════════════════════════════════════════════════════════════

    /// Open the store named by `config` and wire up the collaborators
    pub fn new(
        config: ServiceConfig,
        detector: Arc<dyn Detector>,
        embedder: Arc<dyn Embedder>,
    ) -> ServiceResult<Self> {
        config.validate()?;

        let store = Arc::new(
            SqliteStore::open(&config.database_path, config.embedding_dim)?
                .with_reserved(config.reserved_organizations.clone()),
        );
        let validator = Arc::new(CredentialValidator::new(
            store.clone(),
            Arc::new(MemoryCache::new()),
            ValidatorSettings::from(&config),
        ));

        let runner = Arc::new(PipelineRunner::new(detector, embedder, config.collaborator_timeout()));
        let index: Arc<dyn EmbeddingIndex> = store.clone();
        let registration = RegistrationOrchestrator::new(runner.clone(), index.clone(), config.min_face_confidence);
        let recognition = Arc::new(RecognitionOrchestrator::new(runner.clone(), index));

        log::info!("Face Gate ready (store: {})", config.database_path.display());

        Ok(Self {
            config,
            store,
            validator,
            runner,
            registration,
            recognition,
            redactor: ResultRedactor::new(),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ORGANIZATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Create an organization; `true` if it exists afterwards
    pub fn create_organization(&self, name: &str) -> ServiceResult<bool> {
        validate_organization_name(name, &self.config.reserved_organizations)?;
        self.store.create_organization(name)
    }

    pub fn organization_exists(&self, name: &str) -> ServiceResult<bool> {
        self.store.organization_exists(name)
    }

    pub fn list_organizations(&self) -> ServiceResult<BTreeSet<String>> {
        self.store.list_organizations()
    }

    fn require_organization(&self, name: &str) -> ServiceResult<()> {
        if self.store.organization_exists(name)? {
            Ok(())
        } else {
            Err(TenantError::NotFound(name.to_string()).into())
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CREDENTIALS
    // ═══════════════════════════════════════════════════════════════════════

    /// Issue a credential and return its secret (shown once)
    pub async fn issue_credential(
        &self,
        organization: &str,
        request: IssueCredentialRequest,
    ) -> ServiceResult<IssuedCredentialResponse> {
        self.require_organization(organization)?;

        let validator = Arc::clone(&self.validator);
        let org = organization.to_string();
        let issued = blocking(move || validator.issue(&org, &request.owner, &request.key_name)).await?;

        Ok(IssuedCredentialResponse {
            secret: issued.secret.expose_secret().clone(),
            owner: issued.credential.owner,
            key_name: issued.credential.key_name,
            organization: issued.credential.organization,
            created_at: issued.credential.created_at,
        })
    }

    /// Check a presented secret
    pub async fn validate_credential(&self, organization: &str, auth: &ApiAuth, secret: &str) -> ServiceResult<bool> {
        let validator = Arc::clone(&self.validator);
        let (org, auth) = (organization.to_string(), auth.clone());
        let secret = SecretString::new(secret.to_string());
        blocking(move || validator.validate(&org, &auth.owner, &auth.key_name, secret.expose_secret())).await
    }

    /// Revoke a credential; the caller must present its current secret
    pub async fn revoke_credential(
        &self,
        organization: &str,
        request: RevokeRequest,
        secret: &str,
    ) -> ServiceResult<SuccessResponse> {
        self.require_organization(organization)?;

        let validator = Arc::clone(&self.validator);
        let org = organization.to_string();
        let secret = SecretString::new(secret.to_string());
        let revoked = blocking(move || {
            validator.revoke(&org, &request.owner, &request.key_name, secret.expose_secret())
        })
        .await?;

        Ok(if revoked {
            SuccessResponse::new(true, "Credential revoked")
        } else {
            SuccessResponse::new(false, "Invalid credential")
        })
    }

    /// Operator revocation without the secret
    pub fn force_revoke(&self, organization: &str, owner: &str, key_name: &str) -> ServiceResult<bool> {
        self.validator.force_revoke(organization, owner, key_name)
    }

    /// Active credentials of an organization (hashes are not serialized)
    pub fn list_credentials(&self, organization: &str) -> ServiceResult<Vec<Credential>> {
        self.require_organization(organization)?;
        self.store.list_credentials(organization)
    }

    async fn authenticate(&self, organization: &str, auth: &ApiAuth, secret: &str) -> ServiceResult<()> {
        self.require_organization(organization)?;

        let validator = Arc::clone(&self.validator);
        let (org, auth) = (organization.to_string(), auth.clone());
        let secret = SecretString::new(secret.to_string());
        blocking(move || validator.authenticate(&org, &auth.owner, &auth.key_name, secret.expose_secret())).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FACE OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Enroll images under an identity; `true` iff any embedding was stored
    pub async fn register(&self, organization: &str, request: RegisterRequest, secret: &str) -> ServiceResult<bool> {
        Ok(self.register_detailed(organization, request, secret).await?.success())
    }

    /// Enroll and return per-image outcomes
    pub async fn register_detailed(
        &self,
        organization: &str,
        request: RegisterRequest,
        secret: &str,
    ) -> ServiceResult<RegistrationReport> {
        self.authenticate(organization, &request.api_auth, secret).await?;

        if request.identity_name.trim().is_empty() {
            return Err(ServiceError::BadRequest("identity name is required".into()));
        }

        self.registration
            .register_detailed(request.images, &request.identity_name, organization)
            .await
    }

    /// Recognize faces in one image; the result is redacted
    pub async fn recognize(&self, organization: &str, request: RecognizeRequest, secret: &str) -> ServiceResult<Value> {
        self.authenticate(organization, &request.api_auth, secret).await?;

        let result = self
            .recognition
            .recognize(request.image, request.threshold, organization)
            .await?;
        self.redactor.redact(&result)
    }

    /// Run detection only; the result is redacted
    pub async fn detect(&self, organization: &str, image: String, auth: &ApiAuth, secret: &str) -> ServiceResult<Value> {
        self.authenticate(organization, auth, secret).await?;

        let batch = self.runner.detect(image).await?;
        self.redactor.redact(&batch)
    }

    /// Authenticate once and open a streaming recognize session
    pub async fn open_session(&self, organization: &str, auth: &ApiAuth, secret: &str) -> ServiceResult<RecognitionSession> {
        self.authenticate(organization, auth, secret).await?;
        log::info!("Session opened for {}/{} in '{}'", auth.owner, auth.key_name, organization);

        Ok(RecognitionSession::new(
            Arc::clone(&self.recognition),
            self.redactor.clone(),
            organization,
            self.config.default_threshold,
        ))
    }
}

/// Run a CPU-bound credential call (argon2) on the blocking pool
async fn blocking<T, F>(work: F) -> ServiceResult<T>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(std::io::Error::from)?
}
