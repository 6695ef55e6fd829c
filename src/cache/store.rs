//! Keyed storage for cached responses
//!
//! A store holds at most one [`CacheEntry`] per `(service, url)`. Inserting a
//! key that already exists fails with [`StoreError::Duplicate`]; that is how
//! concurrent writers racing on the same key find out they lost.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::entry::CacheEntry;
use crate::error::StoreError;

/// Persistent storage for cache entries
pub trait EntryStore: Send + Sync {
    /// Returns the entry for the key regardless of age
    fn get(&self, service: &str, url: &str) -> Result<Option<CacheEntry>, StoreError>;

    /// Inserts a new row, failing with [`StoreError::Duplicate`] if the key exists
    fn insert(&self, entry: &CacheEntry) -> Result<(), StoreError>;

    /// Overwrites the row for the entry's key
    fn update(&self, entry: &CacheEntry) -> Result<(), StoreError>;

    /// Returns the entry for the key if it was saved at or after `min_time_saved`
    ///
    /// Entries without a `time_saved` never match.
    fn query(
        &self,
        service: &str,
        url: &str,
        min_time_saved: DateTime<Utc>,
    ) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self
            .get(service, url)?
            .filter(|entry| entry.time_saved.is_some_and(|saved| saved >= min_time_saved)))
    }

    /// Persists the entry, updating it if it was loaded from this store
    fn upsert(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        if entry.is_persisted() {
            self.update(entry)
        } else {
            self.insert(entry)
        }
    }
}

type Key = (String, String);

fn key_of(service: &str, url: &str) -> Key {
    (service.to_string(), url.to_string())
}

/// In-process entry store
///
/// Used in tests and whenever no cache directory is available.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<Key, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Key, CacheEntry>>, StoreError> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned".to_string()))
    }
}

impl EntryStore for MemoryStore {
    fn get(&self, service: &str, url: &str) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self
            .lock()?
            .get(&key_of(service, url))
            .cloned()
            .map(CacheEntry::mark_persisted))
    }

    fn insert(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        let mut rows = self.lock()?;
        let key = key_of(&entry.service, &entry.url);
        if rows.contains_key(&key) {
            return Err(StoreError::Duplicate {
                service: entry.service.clone(),
                url: entry.url.clone(),
            });
        }
        rows.insert(key, entry.clone());
        Ok(())
    }

    fn update(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        self.lock()?
            .insert(key_of(&entry.service, &entry.url), entry.clone());
        Ok(())
    }
}
