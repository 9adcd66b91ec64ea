//! The `CacheStore` contract (§4.7, §6.2): `get/get_entry/set/delete` over
//! JSON-safe values. Hosts may back this with anything (disk, a workbook's
//! own persisted-state blob, Redis); [`InMemoryCacheStore`] is the
//! reference implementation the spec calls out ("reference implementations
//! include an in-memory store").

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: Option<u64>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_ms {
            Some(ttl) => now - self.created_at >= chrono::Duration::milliseconds(ttl as i64),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    pub ttl_ms: Option<u64>,
}

pub trait CacheStore: Send + Sync {
    /// `None` on miss *or* on an expired entry (which this call deletes).
    fn get(&self, key: &str) -> Option<serde_json::Value>;
    /// The raw entry, expired or not — lets a caller inspect `created_at`
    /// without the expiry side effect `get` has.
    fn get_entry(&self, key: &str) -> Option<CacheEntry>;
    fn set(&self, key: &str, value: serde_json::Value, opts: SetOptions);
    fn delete(&self, key: &str);
}

pub struct InMemoryCacheStore {
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock, entries: RwLock::new(HashMap::new()) }
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = self.clock.now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it under a write lock and report a miss.
        self.entries.write().remove(key);
        None
    }

    fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: serde_json::Value, opts: SetOptions) {
        let entry = CacheEntry { value, created_at: self.clock.now(), ttl_ms: opts.ttl_ms };
        self.entries.write().insert(key.to_string(), entry);
    }

    fn delete(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn store_at(start: DateTime<Utc>) -> (InMemoryCacheStore, TestClock) {
        let clock = TestClock::new(start);
        (InMemoryCacheStore::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn hit_then_expiry_after_ttl() {
        let (store, clock) = store_at(Utc::now());
        store.set("k", serde_json::json!(1), SetOptions { ttl_ms: Some(10) });
        assert_eq!(store.get("k"), Some(serde_json::json!(1)));
        clock.advance_ms(11);
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn get_entry_ignores_expiry() {
        let (store, clock) = store_at(Utc::now());
        store.set("k", serde_json::json!(1), SetOptions { ttl_ms: Some(1) });
        clock.advance_ms(5);
        assert!(store.get_entry("k").is_some());
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn delete_removes_entry() {
        let (store, _clock) = store_at(Utc::now());
        store.set("k", serde_json::json!(1), SetOptions::default());
        store.delete("k");
        assert_eq!(store.get("k"), None);
    }
}
