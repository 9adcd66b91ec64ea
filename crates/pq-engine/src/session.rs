//! `QueryExecutionSession` (§4.8): the credential/permission caches and
//! clock shared across every query a single refresh/execution run touches,
//! so a source referenced by more than one query only prompts once.
//! `pq-orchestrator` shares one session across all of a refresh's jobs
//! (§4.9 point 5); a single `Engine::execute` call still goes through a
//! session of its own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use pq_connector::Credentials;

fn cache_key(connector_id: &str, request_key: &serde_json::Value) -> String {
    let canonical = serde_json::to_string(request_key).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{connector_id}:{:x}", hasher.finalize())
}

/// Concurrent de-duplication (§5): the first caller for a given key
/// computes the value and every concurrent caller for the same key gets
/// the same result rather than re-prompting.
pub struct QueryExecutionSession {
    permission_cache: DashMap<String, bool>,
    credential_cache: DashMap<String, Option<Credentials>>,
    pub now: DateTime<Utc>,
}

impl QueryExecutionSession {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { permission_cache: DashMap::new(), credential_cache: DashMap::new(), now }
    }

    pub fn shared(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self::new(now))
    }

    /// Runs `ask` at most once per `(connector_id, request_key)`, caching
    /// the permission decision for the rest of this session.
    pub fn permission(&self, connector_id: &str, kind: &str, details: &serde_json::Value, ask: impl FnOnce() -> bool) -> bool {
        let key = cache_key(connector_id, &serde_json::json!({ "kind": kind, "details": details }));
        *self.permission_cache.entry(key).or_insert_with(ask)
    }

    /// Runs `ask` at most once per `(connector_id, request_key)`, caching
    /// the credential (including a denial, as `None`) for reuse.
    pub fn credentials(&self, connector_id: &str, request_key: &serde_json::Value, ask: impl FnOnce() -> Option<Credentials>) -> Option<Credentials> {
        let key = cache_key(connector_id, request_key);
        self.credential_cache.entry(key).or_insert_with(ask).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn permission_hook_is_called_once_per_key() {
        let session = QueryExecutionSession::new(Utc::now());
        let calls = AtomicUsize::new(0);
        let ask = || {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        };
        assert!(session.permission("file", "read", &serde_json::json!({}), ask));
        assert!(session.permission("file", "read", &serde_json::json!({}), ask));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn credentials_are_cached_per_request_key() {
        let session = QueryExecutionSession::new(Utc::now());
        let calls = AtomicUsize::new(0);
        let ask = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Some(Credentials::with_id("tok", serde_json::json!({})))
        };
        let a = session.credentials("sql", &serde_json::json!({"db": "x"}), ask);
        let b = session.credentials("sql", &serde_json::json!({"db": "x"}), ask);
        assert_eq!(a.unwrap().credential_id, b.unwrap().credential_id);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
