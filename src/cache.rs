//! Face Gate - Validation Cache
//!
//! Remembers fingerprints of recently validated credentials for a bounded
//! time. Presence means "validated within the TTL"; absence means nothing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::error::CacheError;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Time-bounded set of validated fingerprints
pub trait ValidationCache: Send + Sync {
    /// `true` if the fingerprint was validated and has not expired
    fn contains(&self, fingerprint: &str) -> Result<bool, CacheError>;

    /// Mark the fingerprint valid for `ttl`; repeated writes are idempotent
    fn insert(&self, fingerprint: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Drop the fingerprint; `true` if it was present
    fn evict(&self, fingerprint: &str) -> Result<bool, CacheError>;
}

struct Entries {
    valid_until: HashMap<String, Instant>,
    /// Size that triggers the next purge
    purge_at: usize,
}

impl Entries {
    fn purge(&mut self, floor: usize) -> usize {
        let now = Instant::now();
        let before = self.valid_until.len();
        self.valid_until.retain(|_, valid_until| *valid_until > now);
        // Double the headroom over what survived so live entries do not
        // cause a full scan on every insert
        self.purge_at = floor.max(self.valid_until.len().saturating_mul(2));
        before - self.valid_until.len()
    }
}

/// In-process cache
pub struct MemoryCache {
    entries: RwLock<Entries>,
    /// Lowest size at which expired entries are purged
    purge_above: usize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_purge_threshold(4096)
    }

    pub fn with_purge_threshold(purge_above: usize) -> Self {
        Self {
            entries: RwLock::new(Entries {
                valid_until: HashMap::new(),
                purge_at: purge_above,
            }),
            purge_above,
        }
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().valid_until.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        self.entries.write().purge(self.purge_above)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationCache for MemoryCache {
    fn contains(&self, fingerprint: &str) -> Result<bool, CacheError> {
        let entries = self.entries.read();
        Ok(entries
            .valid_until
            .get(fingerprint)
            .map_or(false, |valid_until| *valid_until > Instant::now()))
    }

    fn insert(&self, fingerprint: &str, ttl: Duration) -> Result<(), CacheError> {
        let valid_until = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Unavailable(format!("TTL out of range: {:?}", ttl)))?;

        let mut entries = self.entries.write();
        entries.valid_until.insert(fingerprint.to_string(), valid_until);

        if entries.valid_until.len() > entries.purge_at {
            let purged = entries.purge(self.purge_above);
            log::debug!(
                "Validation cache purged {} expired entries, next purge at {}",
                purged,
                entries.purge_at
            );
        }
        Ok(())
    }

    fn evict(&self, fingerprint: &str) -> Result<bool, CacheError> {
        Ok(self.entries.write().valid_until.remove(fingerprint).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_expire() {
        let cache = MemoryCache::new();
        assert!(!cache.contains("fp").unwrap());

        cache.insert("fp", Duration::from_millis(40)).unwrap();
        assert!(cache.contains("fp").unwrap());

        std::thread::sleep(Duration::from_millis(80));
        assert!(!cache.contains("fp").unwrap());
    }

    #[test]
    fn test_idempotent_writes_extend() {
        let cache = MemoryCache::new();
        cache.insert("fp", Duration::from_secs(60)).unwrap();
        cache.insert("fp", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evict() {
        let cache = MemoryCache::new();
        cache.insert("fp", Duration::from_secs(60)).unwrap();
        assert!(cache.evict("fp").unwrap());
        assert!(!cache.evict("fp").unwrap());
        assert!(!cache.contains("fp").unwrap());
    }

    #[test]
    fn test_purge_threshold() {
        let cache = MemoryCache::with_purge_threshold(2);
        cache.insert("a", Duration::from_millis(1)).unwrap();
        cache.insert("b", Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(10));

        cache.insert("c", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("c").unwrap());
    }

    #[test]
    fn test_live_entries_raise_purge_threshold() {
        let cache = MemoryCache::with_purge_threshold(2);
        for fp in ["a", "b", "c"] {
            cache.insert(fp, Duration::from_secs(60)).unwrap();
        }
        // Nothing expired, so the next purge waits until twice the live size
        assert_eq!(cache.len(), 3);

        cache.insert("d", Duration::from_millis(1)).unwrap();
        cache.insert("e", Duration::from_millis(1)).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        cache.insert("f", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.len(), 6);

        cache.insert("g", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.len(), 5);
        assert!(!cache.contains("d").unwrap());
        assert!(cache.contains("g").unwrap());
    }
}
