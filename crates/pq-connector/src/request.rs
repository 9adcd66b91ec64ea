//! The request payload a connector sees (§6.1, §9's "connector request
//! payloads are modeled as per-connector structs"). `Source` is the plain
//! case — the query's own `QuerySource`; `FoldedSql`/`FoldedOdata` are the
//! cases the engine hands a connector once `pq-folding` has turned a step
//! prefix into a remote query, so the connector never has to know about
//! folding itself.

use pq_common::{QuerySource, Value};

#[derive(Debug, Clone)]
pub enum ConnectorRequest<'a> {
    /// Run the source exactly as declared.
    Source(&'a QuerySource),
    /// Run `sql` (already dialect-rewritten, with `params` bound in
    /// positional order) instead of `base`'s own `sql` field.
    FoldedSql {
        base: &'a QuerySource,
        sql: String,
        params: Vec<Value>,
    },
    /// Run the rendered OData URL instead of `base`'s own `url` field.
    FoldedOdata { base: &'a QuerySource, url: String },
}

impl<'a> ConnectorRequest<'a> {
    /// The `QuerySource` this request ultimately reads from, regardless of
    /// whether folding rewrote the query sent to the backend.
    pub fn base_source(&self) -> &'a QuerySource {
        match self {
            ConnectorRequest::Source(s) => s,
            ConnectorRequest::FoldedSql { base, .. } => base,
            ConnectorRequest::FoldedOdata { base, .. } => base,
        }
    }
}
