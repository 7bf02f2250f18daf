//! In-process cache backend.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use super::{CacheEntry, Fingerprint, ResultCache};
use crate::errors::CacheError;

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, fingerprint: &Fingerprint) -> Option<String> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(fingerprint) {
                None => return None,
                Some(entry) if !entry.is_expired() => return Some(entry.output.clone()),
                Some(_) => {}
            }
        }

        // Expired: drop it, unless a writer replaced it in the meantime.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(fingerprint).is_some_and(CacheEntry::is_expired) {
            entries.remove(fingerprint);
        }
        None
    }

    fn put(
        &self,
        fingerprint: &Fingerprint,
        output: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::new(fingerprint.clone(), output, ttl);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fingerprint.clone(), entry);
        Ok(())
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, CacheError> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(fingerprint)
            .is_some())
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        Ok(before - entries.len())
    }
}
