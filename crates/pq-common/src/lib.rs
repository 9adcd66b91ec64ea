//! Core value, column, table, and query-IR types shared by every crate in
//! the Power Query execution engine. See `SPEC_FULL.md` §3 for the data
//! model this crate implements.

pub mod cancel;
pub mod column;
pub mod error;
pub mod meta;
pub mod query;
pub mod table;
pub mod value;

pub use cancel::CancelToken;
pub use column::{make_unique_column_names, Column, DataType};
pub use error::{ConnectorCause, PqError};
pub use meta::{CacheMeta, ConnectorMeta, Diagnostic, FoldingRecord, Provenance, QueryExecutionMeta, SourceId};
pub use query::*;
pub use table::{ColumnarTable, ITable, Table};
pub use value::{Decimal, ErrorValue, Value};
