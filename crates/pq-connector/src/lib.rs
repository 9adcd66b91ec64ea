//! The `Connector` capability contract (§6.1) and the host hooks (§6.2)
//! the execution engine calls through. This crate intentionally contains
//! no connector *implementations* — file I/O, HTTP clients, and SQL
//! drivers are explicitly out of scope (§1); `testing` holds a minimal
//! in-memory connector used by this workspace's own tests and as a
//! template for a real one.

pub mod credentials;
pub mod hooks;
pub mod registry;
pub mod request;
pub mod testing;

use pq_common::{CancelToken, Column, PqError, Table};

pub use credentials::Credentials;
pub use hooks::{AllowAll, AnonymousCredentials, CredentialHook, PermissionHook, TableAdapter};
pub use registry::ConnectorRegistry;
pub use request::ConnectorRequest;

/// Everything a connector call needs besides the request itself.
pub struct ExecContext {
    pub signal: CancelToken,
    pub credentials: Option<Credentials>,
    pub now: chrono::DateTime<chrono::Utc>,
}

/// Extra inputs to `get_source_state`: the engine's previously cached
/// freshness markers, so a connector can do a cheap HEAD/metadata probe
/// instead of a full read when it already knows what it's comparing against.
pub struct StateContext {
    pub signal: CancelToken,
    pub credentials: Option<Credentials>,
    pub known_etag: Option<String>,
    pub known_source_timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceState {
    pub etag: Option<String>,
    pub source_timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaInfo {
    pub columns: Vec<Column>,
}

pub struct ConnectorResult {
    pub table: Table,
    pub meta: pq_common::ConnectorMeta,
}

/// The capability contract every source-backing connector implements
/// (§6.1). `id` is the stable string the engine uses to look a connector
/// up in a `ConnectorRegistry` and to derive permission/credential cache
/// keys (`"${connectorId}:${hash(get_cache_key(request))}"`, §4.8).
pub trait Connector: Send + Sync {
    fn id(&self) -> &str;
    fn permission_kind(&self) -> &str;

    /// A JSON-safe, stable value that identifies *what* this request reads
    /// (not how — no credentials). Feeds both the session's credential/
    /// permission cache key and `pq-cache`'s query-result cache key.
    fn get_cache_key(&self, request: &ConnectorRequest<'_>) -> serde_json::Value;

    fn execute(&self, request: &ConnectorRequest<'_>, ctx: &ExecContext) -> Result<ConnectorResult, PqError>;

    /// Cheap freshness probe (§4.7 validation, §4.8 step 4). `None` means
    /// this connector doesn't support source-state validation at all —
    /// the engine then treats every cache hit for it as valid until TTL.
    fn get_source_state(
        &self,
        _request: &ConnectorRequest<'_>,
        _ctx: &StateContext,
    ) -> Result<Option<SourceState>, PqError> {
        Ok(None)
    }

    /// Best-effort schema discovery used by the folding planner (§4.6) to
    /// validate a foldable prefix without a full read.
    fn get_schema(&self, _request: &ConnectorRequest<'_>, _ctx: &ExecContext) -> Result<Option<SchemaInfo>, PqError> {
        Ok(None)
    }

    /// SQL connectors only: a stable identity for `connection`, used to
    /// decide whether two `Database` sources can be combined in a single
    /// folded query (§4.6's merge/append folding precondition).
    fn get_connection_identity(&self, _connection: &serde_json::Value) -> Option<String> {
        None
    }
}
