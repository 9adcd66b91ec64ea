//! A minimal in-memory connector, used by this workspace's own tests
//! (`pq-engine`, `pq-orchestrator`) and as a template for a real one. Not
//! wired up by default — a host registers it (or a real connector) itself.

use pq_common::{ConnectorMeta, ITable, Provenance, Table};

use crate::request::ConnectorRequest;
use crate::{Connector, ConnectorResult, ExecContext, SourceState, StateContext};

/// Always returns the same table, tagged with a fixed `source_id`. `etag`
/// lets tests exercise `get_source_state` / cache validation without a
/// real connector.
pub struct StaticConnector {
    id: String,
    table: Table,
    source_id: String,
    etag: Option<String>,
}

impl StaticConnector {
    pub fn new(id: impl Into<String>, table: Table) -> Self {
        let id = id.into();
        Self { source_id: format!("{id}:static"), id, table, etag: None }
    }

    pub fn empty(id: impl Into<String>) -> Self {
        Self::new(id, Table::empty())
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

impl Connector for StaticConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn permission_kind(&self) -> &str {
        "read"
    }

    fn get_cache_key(&self, _request: &ConnectorRequest<'_>) -> serde_json::Value {
        serde_json::json!({ "connector": self.id, "fixture": self.source_id })
    }

    fn execute(&self, _request: &ConnectorRequest<'_>, ctx: &ExecContext) -> Result<ConnectorResult, pq_common::PqError> {
        Ok(ConnectorResult {
            table: self.table.clone(),
            meta: ConnectorMeta {
                refreshed_at: ctx.now,
                source_timestamp: None,
                etag: self.etag.clone(),
                source_key: Some(self.source_id.clone()),
                schema: self.table.columns().to_vec(),
                row_count: self.table.row_count(),
                row_count_estimate: None,
                provenance: Provenance { source_id: self.source_id.clone() },
            },
        })
    }

    fn get_source_state(
        &self,
        _request: &ConnectorRequest<'_>,
        _ctx: &StateContext,
    ) -> Result<Option<SourceState>, pq_common::PqError> {
        Ok(Some(SourceState { etag: self.etag.clone(), source_timestamp: None }))
    }
}
