//! What a query execution produces: the table, plus the metadata an
//! orchestrator or host persists alongside it (§4.8 step 7).

use pq_common::{QueryExecutionMeta, Table};

#[derive(Debug, Clone)]
pub struct QueryExecutionResult {
    pub table: Table,
    pub meta: QueryExecutionMeta,
}

/// The envelope actually written to the cache store (§4.8 step 8):
/// just enough to reconstruct a `QueryExecutionResult` on a hit without
/// re-running anything.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct CachedResult {
    pub table: Table,
    pub meta: QueryExecutionMeta,
}

impl From<QueryExecutionResult> for CachedResult {
    fn from(r: QueryExecutionResult) -> Self {
        Self { table: r.table, meta: r.meta }
    }
}

impl From<CachedResult> for QueryExecutionResult {
    fn from(c: CachedResult) -> Self {
        Self { table: c.table, meta: c.meta }
    }
}
