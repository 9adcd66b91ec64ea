//! Execution metadata (§3): what a connector reports about the data it
//! loaded, and what the engine assembles about a whole query run.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::query::QueryId;

/// A stable identity for a physical source, used by join/append to decide
/// whether they're crossing a privacy boundary (§5).
pub type SourceId = String;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub source_id: SourceId,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorMeta {
    pub refreshed_at: chrono::DateTime<chrono::Utc>,
    pub source_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub etag: Option<String>,
    pub source_key: Option<String>,
    pub schema: Vec<Column>,
    pub row_count: usize,
    pub row_count_estimate: Option<usize>,
    pub provenance: Provenance,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMeta {
    pub key: String,
    pub hit: bool,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "camelCase"))]
pub enum FoldingRecord {
    None,
    Sql {
        dialect: crate::query::SqlDialect,
        sql: String,
        params: Vec<crate::value::Value>,
        local_steps: Vec<String>,
        local_step_offset: usize,
    },
    Odata {
        url: String,
        local_steps: Vec<String>,
        local_step_offset: usize,
    },
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExecutionMeta {
    pub query_id: QueryId,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub refreshed_at: chrono::DateTime<chrono::Utc>,
    pub sources: Vec<ConnectorMeta>,
    pub output_schema: Vec<Column>,
    pub output_row_count: usize,
    pub cache: Option<CacheMeta>,
    pub folding: FoldingRecord,
}

/// Structured record of a diagnostic raised during planning/execution,
/// mirroring the `privacy:firewall` / `stream:spill` progress events in a
/// form a host can collect after the fact instead of subscribing live.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    PrivacyFirewall { step_id: String, reason: String },
    StreamSpill { operator: String },
}
