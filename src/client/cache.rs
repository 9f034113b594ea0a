//! TTL response cache for the request client
//!
//! Entries are JSON values keyed by an opaque string. The TTL is supplied at
//! read time, so calls sharing a key may use different freshness windows. An
//! entry whose age has reached the TTL is never returned and is evicted on the
//! read that finds it stale.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// A cached response
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Value,
    pub timestamp: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.timestamp.elapsed() < ttl
    }
}

/// Shared response cache
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a fresh entry
    pub fn get(&self, key: &str, ttl: Duration) -> Option<Value> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(entry) if entry.is_fresh(ttl) => return Some(entry.data.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Stale: evict, unless a concurrent writer refreshed it meanwhile
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).is_some_and(|entry| !entry.is_fresh(ttl)) {
            entries.remove(key);
            tracing::debug!(cache_key = %key, "Evicted stale cache entry");
        }
        None
    }

    /// Store (or overwrite) an entry stamped now
    pub fn insert(&self, key: impl Into<String>, data: Value) {
        let entry = CacheEntry {
            data,
            timestamp: Instant::now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), entry);
    }

    /// Remove entries whose key matches `pattern`, or everything when `None`
    ///
    /// The pattern is a regular expression; if it does not compile it is
    /// matched as a plain substring. Returns the number of removed entries.
    pub fn clear(&self, pattern: Option<&str>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();

        match pattern {
            None => entries.clear(),
            Some(pattern) => match Regex::new(pattern) {
                Ok(re) => entries.retain(|key, _| !re.is_match(key)),
                Err(_) => entries.retain(|key, _| !key.contains(pattern)),
            },
        }

        let removed = before - entries.len();
        tracing::debug!(pattern = ?pattern, removed, "Cleared cache entries");
        removed
    }

    /// Keys of entries still fresh under `ttl`, sorted
    pub fn keys(&self, ttl: Duration) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_fresh(ttl))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of stored entries, fresh or not
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
