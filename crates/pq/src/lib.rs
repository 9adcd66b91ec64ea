//! Meta crate that ties the Power Query component crates (C1-C7) together
//! behind a single dependency. Re-exports each component crate as a module
//! and hoists the types most callers need up to the crate root, so a
//! downstream user can depend on `pq` alone and reach for `pq::common::*`,
//! `pq::engine::*`, etc. when they need a specific layer.

pub use pq_cache as cache;
pub use pq_common as common;
pub use pq_connector as connector;
pub use pq_engine as engine;
pub use pq_folding as folding;
pub use pq_operators as operators;
pub use pq_orchestrator as orchestrator;
pub use pq_streaming as streaming;

pub use pq_common::{
    CacheMeta, CancelToken, Column, ColumnarTable, ConnectorMeta, DataType, Diagnostic,
    FoldingRecord, ITable, PqError, Provenance, Query, QueryExecutionMeta, QueryId, QueryOperation,
    QuerySource, QueryStep, SourceId, SqlDialect, Table, Value,
};
pub use pq_connector::{Connector, ConnectorRegistry};
pub use pq_engine::{
    Engine, ExecutionContext, ExecutionOptions, ProgressEvent, QueryExecutionResult,
    QueryExecutionSession,
};
pub use pq_orchestrator::{RefreshEvent, RefreshOptions, RefreshOrchestrator, RefreshOutcome, RefreshReport};
