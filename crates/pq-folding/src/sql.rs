//! SQL folding (§4.6): renders a foldable step prefix plus the database
//! source's own `sql` text into one statement for a target `SqlDialect`.

pub mod dialect;
pub mod expr;
pub mod plan;

pub use plan::{fold_sql_prefix, SiblingResolver, SqlFoldPlan};
