//! Face Gate - Credential Lifecycle
//!
//! Issuance, validation and revocation of tenant-scoped API credentials.
//!
//! Validation consults the `ValidationCache` first and only falls through to
//! the store on a miss. The cache is never authoritative: any cache failure is
//! logged and treated as a miss, and negative results are never cached.
//!
//! Revocation deletes the stored record but, unless `evict_on_revoke` is set,
//! leaves any cache entry in place. A revoked secret can therefore keep
//! validating from cache until its TTL runs out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};

use crate::cache::ValidationCache;
use crate::config::ServiceConfig;
use crate::crypto::{generate_secret, hash_secret, verify_secret, Fingerprinter, HashingConfig};
use crate::error::{CredentialError, ServiceError, ServiceResult, TenantError};
use crate::model::{Credential, CredentialKey};
use crate::store::CredentialStore;

/// Validator tuning taken from `ServiceConfig`
#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    pub cache_ttl: Duration,
    pub hashing: HashingConfig,
    pub evict_on_revoke: bool,
}

impl From<&ServiceConfig> for ValidatorSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            cache_ttl: config.cache_ttl(),
            hashing: config.hashing.clone(),
            evict_on_revoke: config.evict_on_revoke,
        }
    }
}

/// Result of a successful issuance. The plaintext exists only here.
pub struct IssuedCredential {
    pub secret: SecretString,
    pub credential: Credential,
}

impl std::fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("secret", &"[REDACTED]")
            .field("credential", &self.credential)
            .finish()
    }
}

/// Credential issuance, validation and revocation
pub struct CredentialValidator {
    store: Arc<dyn CredentialStore>,
    cache: Arc<dyn ValidationCache>,
    fingerprinter: Fingerprinter,
    settings: ValidatorSettings,
}

impl CredentialValidator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn ValidationCache>,
        settings: ValidatorSettings,
    ) -> Self {
        Self {
            store,
            cache,
            fingerprinter: Fingerprinter::generate(),
            settings,
        }
    }

    pub fn settings(&self) -> &ValidatorSettings {
        &self.settings
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ISSUE
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a credential and return its plaintext secret once
    pub fn issue(&self, organization: &str, owner: &str, key_name: &str) -> ServiceResult<IssuedCredential> {
        if owner.trim().is_empty() || key_name.trim().is_empty() {
            return Err(ServiceError::BadRequest("owner and key name are required".into()));
        }
        if !self.store.organization_exists(organization)? {
            return Err(TenantError::NotFound(organization.to_string()).into());
        }

        let key = CredentialKey::new(organization, owner, key_name);
        if self.store.find_credential(&key)?.is_some() {
            return Err(duplicate(&key).into());
        }

        let secret = generate_secret();
        let secret_hash = hash_secret(secret.expose_secret(), &self.settings.hashing)?;
        let credential = Credential::new(&key, secret_hash);

        // The store's unique index settles races between concurrent issuers
        self.store.insert_credential(&credential)?;
        log::info!("Issued credential {}", key);

        Ok(IssuedCredential { secret, credential })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // VALIDATE
    // ═══════════════════════════════════════════════════════════════════════

    /// `true` iff `presented` is the secret of the active credential
    pub fn validate(
        &self,
        organization: &str,
        owner: &str,
        key_name: &str,
        presented: &str,
    ) -> ServiceResult<bool> {
        let key = CredentialKey::new(organization, owner, key_name);
        let fingerprint = self.fingerprinter.fingerprint(&key, presented);

        match self.cache.contains(&fingerprint) {
            Ok(true) => {
                log::debug!("Validation cache hit for {}", key);
                return Ok(true);
            }
            Ok(false) => {}
            Err(e) => log::warn!("Validation cache read failed, using store: {}", e),
        }

        let credential = match self.store.find_credential(&key)? {
            Some(credential) => credential,
            None => {
                log::debug!("No active credential {}", key);
                return Ok(false);
            }
        };

        if !verify_secret(presented, &credential.secret_hash) {
            log::warn!("Secret mismatch for {}", key);
            return Ok(false);
        }

        if let Err(e) = self.store.touch_credential(&key, Utc::now()) {
            log::warn!("Could not record last use of {}: {}", key, e);
        }
        if let Err(e) = self.cache.insert(&fingerprint, self.settings.cache_ttl) {
            log::warn!("Validation cache write failed: {}", e);
        }

        Ok(true)
    }

    /// Like `validate`, but a rejection is an error
    pub fn authenticate(
        &self,
        organization: &str,
        owner: &str,
        key_name: &str,
        presented: &str,
    ) -> ServiceResult<()> {
        if self.validate(organization, owner, key_name, presented)? {
            Ok(())
        } else {
            Err(CredentialError::InvalidSecret.into())
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REVOKE
    // ═══════════════════════════════════════════════════════════════════════

    /// Delete the credential after proving possession of its secret.
    ///
    /// The secret is checked against the stored hash, never the cache: a
    /// cached fingerprint of an earlier, already revoked secret must not be
    /// able to delete a credential issued after it.
    pub fn revoke(
        &self,
        organization: &str,
        owner: &str,
        key_name: &str,
        presented: &str,
    ) -> ServiceResult<bool> {
        let key = CredentialKey::new(organization, owner, key_name);

        let credential = match self.store.find_credential(&key)? {
            Some(credential) => credential,
            None => {
                log::debug!("No active credential {} to revoke", key);
                return Ok(false);
            }
        };
        if !verify_secret(presented, &credential.secret_hash) {
            log::warn!("Revocation of {} refused: secret mismatch", key);
            return Ok(false);
        }

        // By id, so a credential re-issued in the meantime survives
        let deleted = self.store.delete_credential_by_id(&credential.id)?;

        if self.settings.evict_on_revoke {
            let fingerprint = self.fingerprinter.fingerprint(&key, presented);
            if let Err(e) = self.cache.evict(&fingerprint) {
                log::warn!("Validation cache eviction failed for {}: {}", key, e);
            }
        }

        if deleted {
            log::info!("Revoked credential {}", key);
        }
        Ok(deleted)
    }

    /// Operator revocation without the secret.
    ///
    /// Cache entries cannot be enumerated without the secret, so a cached
    /// validation stays usable until its TTL elapses.
    pub fn force_revoke(&self, organization: &str, owner: &str, key_name: &str) -> ServiceResult<bool> {
        let key = CredentialKey::new(organization, owner, key_name);
        let deleted = self.store.delete_credential(&key)?;
        if deleted {
            log::warn!("Force-revoked credential {}", key);
        }
        Ok(deleted)
    }
}

fn duplicate(key: &CredentialKey) -> CredentialError {
    CredentialError::Duplicate {
        organization: key.organization.clone(),
        owner: key.owner.clone(),
        key_name: key.key_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::CacheError;
    use crate::store::SqliteStore;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Store wrapper counting credential lookups
    struct CountingStore {
        inner: SqliteStore,
        lookups: AtomicUsize,
    }

    impl CredentialStore for CountingStore {
        fn create_organization(&self, name: &str) -> ServiceResult<bool> {
            self.inner.create_organization(name)
        }
        fn organization_exists(&self, name: &str) -> ServiceResult<bool> {
            self.inner.organization_exists(name)
        }
        fn list_organizations(&self) -> ServiceResult<BTreeSet<String>> {
            self.inner.list_organizations()
        }
        fn find_credential(&self, key: &CredentialKey) -> ServiceResult<Option<Credential>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_credential(key)
        }
        fn insert_credential(&self, credential: &Credential) -> ServiceResult<()> {
            self.inner.insert_credential(credential)
        }
        fn touch_credential(&self, key: &CredentialKey, at: chrono::DateTime<Utc>) -> ServiceResult<()> {
            self.inner.touch_credential(key, at)
        }
        fn delete_credential(&self, key: &CredentialKey) -> ServiceResult<bool> {
            self.inner.delete_credential(key)
        }
        fn delete_credential_by_id(&self, id: &Uuid) -> ServiceResult<bool> {
            self.inner.delete_credential_by_id(id)
        }
        fn list_credentials(&self, organization: &str) -> ServiceResult<Vec<Credential>> {
            self.inner.list_credentials(organization)
        }
    }

    /// Cache that is always down
    struct BrokenCache;

    impl ValidationCache for BrokenCache {
        fn contains(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn insert(&self, _: &str, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        fn evict(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    fn settings(ttl: Duration, evict_on_revoke: bool) -> ValidatorSettings {
        ValidatorSettings {
            cache_ttl: ttl,
            hashing: HashingConfig::fast(),
            evict_on_revoke,
        }
    }

    fn setup(ttl: Duration, evict_on_revoke: bool) -> (Arc<CountingStore>, CredentialValidator) {
        let store = Arc::new(CountingStore {
            inner: SqliteStore::open_in_memory(4).unwrap(),
            lookups: AtomicUsize::new(0),
        });
        store.create_organization("acme").unwrap();
        let validator = CredentialValidator::new(
            store.clone(),
            Arc::new(MemoryCache::new()),
            settings(ttl, evict_on_revoke),
        );
        (store, validator)
    }

    #[test]
    fn test_issue_and_validate() {
        let (_, v) = setup(Duration::from_secs(60), false);
        let issued = v.issue("acme", "ops", "ci").unwrap();
        let secret = issued.secret.expose_secret();

        assert_eq!(issued.credential.owner, "ops");
        assert!(issued.credential.active);
        assert!(v.validate("acme", "ops", "ci", secret).unwrap());
    }

    #[test]
    fn test_validate_rejects_mismatches() {
        let (_, v) = setup(Duration::from_secs(60), false);
        let issued = v.issue("acme", "ops", "ci").unwrap();
        let secret = issued.secret.expose_secret();

        assert!(!v.validate("acme", "ops", "ci", "wrong").unwrap());
        assert!(!v.validate("acme", "dev", "ci", secret).unwrap());
        assert!(!v.validate("acme", "ops", "cd", secret).unwrap());
        assert!(!v.validate("globex", "ops", "ci", secret).unwrap());
        assert!(matches!(
            v.authenticate("acme", "ops", "ci", "wrong"),
            Err(ServiceError::Credential(CredentialError::InvalidSecret))
        ));
    }

    #[test]
    fn test_duplicate_issue_fails() {
        let (_, v) = setup(Duration::from_secs(60), false);
        v.issue("acme", "ops", "ci").unwrap();
        assert!(matches!(
            v.issue("acme", "ops", "ci"),
            Err(ServiceError::Credential(CredentialError::Duplicate { .. }))
        ));
        // A different key name is fine
        assert!(v.issue("acme", "ops", "cd").is_ok());
    }

    #[test]
    fn test_issue_requires_organization() {
        let (_, v) = setup(Duration::from_secs(60), false);
        assert!(matches!(
            v.issue("globex", "ops", "ci"),
            Err(ServiceError::Tenant(TenantError::NotFound(_)))
        ));
        assert!(matches!(v.issue("acme", "", "ci"), Err(ServiceError::BadRequest(_))));
    }

    #[test]
    fn test_cache_hit_skips_store() {
        let (store, v) = setup(Duration::from_secs(60), false);
        let issued = v.issue("acme", "ops", "ci").unwrap();
        let secret = issued.secret.expose_secret();

        assert!(v.validate("acme", "ops", "ci", secret).unwrap());
        let after_first = store.lookups.load(Ordering::SeqCst);

        assert!(v.validate("acme", "ops", "ci", secret).unwrap());
        assert_eq!(store.lookups.load(Ordering::SeqCst), after_first);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let (store, v) = setup(Duration::from_secs(60), false);
        v.issue("acme", "ops", "ci").unwrap();

        assert!(!v.validate("acme", "ops", "ci", "wrong").unwrap());
        let before = store.lookups.load(Ordering::SeqCst);
        assert!(!v.validate("acme", "ops", "ci", "wrong").unwrap());
        assert_eq!(store.lookups.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_validate_records_last_use() {
        let (store, v) = setup(Duration::from_secs(60), false);
        let issued = v.issue("acme", "ops", "ci").unwrap();
        let key = CredentialKey::new("acme", "ops", "ci");
        assert!(store.find_credential(&key).unwrap().unwrap().last_used_at.is_none());

        v.validate("acme", "ops", "ci", issued.secret.expose_secret()).unwrap();
        assert!(store.find_credential(&key).unwrap().unwrap().last_used_at.is_some());
    }

    #[test]
    fn test_plaintext_not_retrievable() {
        let (store, v) = setup(Duration::from_secs(60), false);
        let issued = v.issue("acme", "ops", "ci").unwrap();
        let secret = issued.secret.expose_secret().clone();

        let stored = store
            .find_credential(&CredentialKey::new("acme", "ops", "ci"))
            .unwrap()
            .unwrap();
        assert_ne!(stored.secret_hash, secret);
        assert!(!stored.secret_hash.contains(&secret));
        assert!(!serde_json::to_string(&stored).unwrap().contains(&secret));
        assert!(!format!("{:?}", issued).contains(&secret));
    }

    #[test]
    fn test_revoke_requires_secret() {
        let (store, v) = setup(Duration::from_secs(60), false);
        let issued = v.issue("acme", "ops", "ci").unwrap();

        assert!(!v.revoke("acme", "ops", "ci", "wrong").unwrap());
        assert!(v.revoke("acme", "ops", "ci", issued.secret.expose_secret()).unwrap());
        assert!(store
            .find_credential(&CredentialKey::new("acme", "ops", "ci"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_revoked_credential_validates_from_cache_until_ttl() {
        let ttl = Duration::from_millis(150);
        let (store, v) = setup(ttl, false);
        let issued = v.issue("acme", "ops", "ci").unwrap();
        let secret = issued.secret.expose_secret();

        assert!(v.validate("acme", "ops", "ci", secret).unwrap());
        assert!(v.revoke("acme", "ops", "ci", secret).unwrap());
        assert!(store
            .find_credential(&CredentialKey::new("acme", "ops", "ci"))
            .unwrap()
            .is_none());

        // Stale but bounded: the cache still vouches for the secret
        assert!(v.validate("acme", "ops", "ci", secret).unwrap());

        std::thread::sleep(ttl + Duration::from_millis(100));
        assert!(!v.validate("acme", "ops", "ci", secret).unwrap());
    }

    #[test]
    fn test_evict_on_revoke_closes_window() {
        let (_, v) = setup(Duration::from_secs(60), true);
        let issued = v.issue("acme", "ops", "ci").unwrap();
        let secret = issued.secret.expose_secret();

        assert!(v.validate("acme", "ops", "ci", secret).unwrap());
        assert!(v.revoke("acme", "ops", "ci", secret).unwrap());
        assert!(!v.validate("acme", "ops", "ci", secret).unwrap());
    }

    #[test]
    fn test_reissue_after_revoke() {
        let (_, v) = setup(Duration::from_secs(60), true);
        let first = v.issue("acme", "ops", "ci").unwrap();
        v.revoke("acme", "ops", "ci", first.secret.expose_secret()).unwrap();

        let second = v.issue("acme", "ops", "ci").unwrap();
        assert!(v.validate("acme", "ops", "ci", second.secret.expose_secret()).unwrap());
        assert!(!v.validate("acme", "ops", "ci", first.secret.expose_secret()).unwrap());
    }

    #[test]
    fn test_stale_secret_cannot_revoke_reissued_credential() {
        let (store, v) = setup(Duration::from_secs(60), false);
        let first = v.issue("acme", "ops", "ci").unwrap();
        let old = first.secret.expose_secret();

        assert!(v.validate("acme", "ops", "ci", old).unwrap());
        assert!(v.revoke("acme", "ops", "ci", old).unwrap());
        let second = v.issue("acme", "ops", "ci").unwrap();

        // The old fingerprint is still cached, but revocation checks the store
        assert!(!v.revoke("acme", "ops", "ci", old).unwrap());
        let current = store
            .find_credential(&CredentialKey::new("acme", "ops", "ci"))
            .unwrap()
            .unwrap();
        assert_eq!(current.id, second.credential.id);

        assert!(v.revoke("acme", "ops", "ci", second.secret.expose_secret()).unwrap());
    }

    #[test]
    fn test_force_revoke() {
        let (_, v) = setup(Duration::from_secs(60), false);
        let issued = v.issue("acme", "ops", "ci").unwrap();
        assert!(v.force_revoke("acme", "ops", "ci").unwrap());
        assert!(!v.force_revoke("acme", "ops", "ci").unwrap());
        // Never validated, so nothing was cached
        assert!(!v.validate("acme", "ops", "ci", issued.secret.expose_secret()).unwrap());
    }

    #[test]
    fn test_cache_outage_falls_back_to_store() {
        let store = Arc::new(SqliteStore::open_in_memory(4).unwrap());
        store.create_organization("acme").unwrap();
        let v = CredentialValidator::new(
            store,
            Arc::new(BrokenCache),
            settings(Duration::from_secs(60), true),
        );

        let issued = v.issue("acme", "ops", "ci").unwrap();
        let secret = issued.secret.expose_secret();
        assert!(v.validate("acme", "ops", "ci", secret).unwrap());
        assert!(!v.validate("acme", "ops", "ci", "wrong").unwrap());
        assert!(v.revoke("acme", "ops", "ci", secret).unwrap());
        assert!(!v.validate("acme", "ops", "ci", secret).unwrap());
    }
}
