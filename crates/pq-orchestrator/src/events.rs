//! Orchestrator progress events (§4.9 point 7): `job:queued|start|
//! complete|error|cancelled`. Mirrors `pq_engine::ProgressEvent`'s "plain
//! callback, not a channel" style, but the callback here must be
//! `Fn + Send + Sync` rather than `FnMut` since worker threads call it
//! concurrently.

use pq_common::{PqError, QueryId};

#[derive(Debug, Clone)]
pub enum RefreshEvent {
    JobQueued { query_id: QueryId },
    JobStart { query_id: QueryId },
    JobComplete { query_id: QueryId },
    JobError { query_id: QueryId, error: PqError },
    /// Also covers a job skipped because one of its dependencies failed or
    /// was itself cancelled — `reason` distinguishes the two ("refresh
    /// cancelled" vs. "dependency '<id>' failed"), since §4.9 names only
    /// one `cancelled` event and doesn't add a separate `skipped` kind.
    JobCancelled { query_id: QueryId, reason: String },
}

/// A sink that does nothing, for callers that don't need refresh events.
pub fn noop_sink(_event: RefreshEvent) {}
