//! Progress events (§4.8, §4.6's privacy diagnostics): the engine reports
//! these through a plain callback rather than a channel or async stream,
//! matching the rest of this workspace's synchronous style (compare
//! `pq_streaming::StreamEvent`).

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    CacheHit { query_id: String },
    CacheMiss { query_id: String },
    CacheSet { query_id: String },
    SourceStart { query_id: String, connector_id: String },
    SourceComplete { query_id: String, connector_id: String },
    StepStart { query_id: String, step_id: String },
    StepComplete { query_id: String, step_id: String },
    StreamBatch { query_id: String, step_id: String, rows: usize },
    StreamSpill { query_id: String, step_id: String, operator: String },
    PrivacyFirewall { query_id: String, step_id: String, reason: String },
}

/// A sink that does nothing, for callers that don't need progress events.
pub fn noop_sink(_event: ProgressEvent) {}
