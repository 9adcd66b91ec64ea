//! Query-folding planners (C4, §4.6): translate a foldable prefix of a
//! query's step list into a remote SQL statement or OData query string,
//! leaving the rest to run locally. `pq-engine` owns deciding *whether* a
//! query's source is remote-foldable at all (and the privacy-firewall
//! check that can force a step back to local); this crate only knows how
//! to render the subset of operators each backend understands.

pub mod odata;
pub mod sql;

pub use odata::{fold_odata_prefix, ODataFoldPlan};
pub use sql::{fold_sql_prefix, SiblingResolver, SqlFoldPlan};

/// Shared across both planners (§4.6): whether folding consumed none, all,
/// or part of the step prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldKind {
    Local,
    Remote,
    Hybrid,
}

impl FoldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FoldKind::Local => "local",
            FoldKind::Remote => "remote",
            FoldKind::Hybrid => "hybrid",
        }
    }
}
