//! Privacy-level classification and the merge/append firewall (§4.6's
//! "disparate privacy levels", §5, §7's `PrivacyBlocked`). `spec.md` names
//! the firewall but leaves the level taxonomy and enforcement point to the
//! implementer; this mirrors the real Power Query model closely enough to
//! be recognizable while staying small: see the Open Question decision in
//! `DESIGN.md` for the exact rule.

use std::collections::HashMap;

use pq_common::SourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivacyLevel {
    Public,
    Organizational,
    Private,
}

/// Host-supplied classification of a source's privacy level, keyed by the
/// `source_id` each `ConnectorMeta` carries. A source with no entry is
/// unclassified and never participates in the firewall — this is the
/// default for a host that hasn't configured privacy levels at all.
#[derive(Debug, Clone, Default)]
pub struct PrivacyClassifier {
    levels: HashMap<SourceId, PrivacyLevel>,
}

impl PrivacyClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&mut self, source_id: impl Into<SourceId>, level: PrivacyLevel) {
        self.levels.insert(source_id.into(), level);
    }

    pub fn level_of(&self, source_id: &str) -> Option<PrivacyLevel> {
        self.levels.get(source_id).copied()
    }

    /// Whether combining `left`/`right` (a merge or append) crosses a
    /// privacy boundary. `Public` data may flow into anything (it can't
    /// leak); two unclassified or equal-level sources always combine;
    /// anything else (e.g. `Private` next to `Organizational`) is blocked.
    pub fn may_combine(&self, left: &str, right: &str) -> bool {
        match (self.level_of(left), self.level_of(right)) {
            (None, _) | (_, None) => true,
            (Some(a), Some(b)) if a == b => true,
            (Some(PrivacyLevel::Public), _) | (_, Some(PrivacyLevel::Public)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unclassified_sources_always_combine() {
        let c = PrivacyClassifier::new();
        assert!(c.may_combine("a", "b"));
    }

    #[test]
    fn private_and_organizational_do_not_combine() {
        let mut c = PrivacyClassifier::new();
        c.classify("a", PrivacyLevel::Private);
        c.classify("b", PrivacyLevel::Organizational);
        assert!(!c.may_combine("a", "b"));
    }

    #[test]
    fn public_combines_with_anything() {
        let mut c = PrivacyClassifier::new();
        c.classify("a", PrivacyLevel::Private);
        c.classify("b", PrivacyLevel::Public);
        assert!(c.may_combine("a", "b"));
    }
}
