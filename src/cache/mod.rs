//! Time-bounded memoization of invocation results.
//!
//! The cache maps a `Fingerprint` to an opaque output string. Entries expire
//! once their age reaches their TTL; expired entries behave exactly like
//! absent ones and are dropped lazily when next touched.
//!
//! Backends are explicit values shared by `Arc<dyn ResultCache>`; there is no
//! process-wide cache.

pub mod file;
pub mod fingerprint;
pub mod memory;

pub use file::FileCache;
pub use fingerprint::Fingerprint;
pub use memory::MemoryCache;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::CacheError;

pub const DEFAULT_TTL_SECS: u64 = 3600;

/// A stored output with its expiry metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub output: String,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: u64,
}

impl CacheEntry {
    pub fn new(fingerprint: Fingerprint, output: impl Into<String>, ttl: Duration) -> Self {
        Self {
            fingerprint,
            output: output.into(),
            created_at: Utc::now(),
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .unwrap_or(chrono::Duration::MAX);
        self.created_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Expired at and after `created_at + ttl`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// A fingerprint-keyed store for invocation outputs.
///
/// Implementations must tolerate concurrent `get`/`put` from several runs.
/// Concurrent writers to one fingerprint resolve last-writer-wins.
pub trait ResultCache: Send + Sync {
    /// The cached output, or `None` when absent, expired or unreadable.
    fn get(&self, fingerprint: &Fingerprint) -> Option<String>;

    /// Store `output`, replacing any existing entry for `fingerprint`.
    fn put(&self, fingerprint: &Fingerprint, output: &str, ttl: Duration)
    -> Result<(), CacheError>;

    fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, CacheError>;

    /// Drop every entry, returning how many were removed.
    fn clear(&self) -> Result<usize, CacheError>;

    /// Drop expired entries, returning how many were removed.
    fn purge_expired(&self) -> Result<usize, CacheError>;
}

/// A cache that never stores anything. Used when caching is disabled.
pub struct NoCache;

impl ResultCache for NoCache {
    fn get(&self, _fingerprint: &Fingerprint) -> Option<String> {
        None
    }

    fn put(
        &self,
        _fingerprint: &Fingerprint,
        _output: &str,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    fn remove(&self, _fingerprint: &Fingerprint) -> Result<bool, CacheError> {
        Ok(false)
    }

    fn clear(&self) -> Result<usize, CacheError> {
        Ok(0)
    }

    fn purge_expired(&self) -> Result<usize, CacheError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::{CapabilitySet, ReasoningLevel};

    fn fp() -> Fingerprint {
        Fingerprint::compute("p", &CapabilitySet::new(), ReasoningLevel::None)
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let entry = CacheEntry::new(fp(), "out", Duration::from_secs(10));
        let created = entry.created_at;
        assert!(!entry.is_expired_at(created));
        assert!(!entry.is_expired_at(created + chrono::Duration::milliseconds(9_999)));
        assert!(entry.is_expired_at(created + chrono::Duration::seconds(10)));
        assert!(entry.is_expired_at(created + chrono::Duration::seconds(11)));
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let entry = CacheEntry::new(fp(), "out", Duration::ZERO);
        assert!(entry.is_expired_at(entry.created_at));
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let entry = CacheEntry::new(fp(), "out", Duration::MAX);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_no_cache_never_hits() {
        let cache = NoCache;
        cache.put(&fp(), "out", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get(&fp()), None);
        assert_eq!(cache.clear().unwrap(), 0);
    }
}
