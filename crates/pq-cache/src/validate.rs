//! Source-state validation (§4.7): when the engine is in `source-state`
//! validation mode, a cache hit is only honored if every cached source's
//! `etag`/`source_timestamp` still matches a fresh probe.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceState {
    pub etag: Option<String>,
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl SourceState {
    fn is_empty(&self) -> bool {
        self.etag.is_none() && self.source_timestamp.is_none()
    }
}

/// `fresh = None` means the connector doesn't support `get_source_state`
/// at all, so the cached entry can't be contradicted — it stays valid.
/// `fresh = Some(state)` is compared against what was cached; a mismatch,
/// *or* source-state newly appearing where none was captured before,
/// forces invalidation.
pub fn is_still_valid(cached: &SourceState, fresh: Option<&SourceState>) -> bool {
    match fresh {
        None => true,
        Some(fresh) => {
            if cached.is_empty() && !fresh.is_empty() {
                return false;
            }
            cached == fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_probe_support_means_always_valid() {
        let cached = SourceState { etag: Some("a".into()), source_timestamp: None };
        assert!(is_still_valid(&cached, None));
    }

    #[test]
    fn matching_etag_is_valid() {
        let cached = SourceState { etag: Some("a".into()), source_timestamp: None };
        let fresh = SourceState { etag: Some("a".into()), source_timestamp: None };
        assert!(is_still_valid(&cached, Some(&fresh)));
    }

    #[test]
    fn changed_etag_invalidates() {
        let cached = SourceState { etag: Some("a".into()), source_timestamp: None };
        let fresh = SourceState { etag: Some("b".into()), source_timestamp: None };
        assert!(!is_still_valid(&cached, Some(&fresh)));
    }

    #[test]
    fn newly_appearing_source_state_invalidates() {
        let cached = SourceState::default();
        let fresh = SourceState { etag: Some("a".into()), source_timestamp: None };
        assert!(!is_still_valid(&cached, Some(&fresh)));
    }
}
