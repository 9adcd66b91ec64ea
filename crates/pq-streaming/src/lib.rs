//! Streaming execution mode (C3): compiles a narrow operator prefix into a
//! batch-at-a-time [`pipeline::Pipeline`], drives it with [`consumer::run_pipeline`],
//! and runs the external-memory sort/group/merge operators of §4.5 for the
//! wide operators a streamable sequence may still contain.

pub mod classifier;
pub mod consumer;
pub mod external_group;
pub mod external_merge;
pub mod external_sort;
pub mod materialize;
pub mod pipeline;
pub mod spill;

pub use classifier::{is_streamable, split_narrow_prefix};
pub use consumer::run_pipeline;
pub use materialize::{run_wide_op, StreamingOptions};
pub use pipeline::{BatchOutput, Pipeline};

/// Observable streaming progress, a subset of the engine's `ProgressEvent`
/// (§4.8/§4.9) relevant to this crate. `pq-engine` maps these into its own
/// event enum rather than depending back on this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    Batch { rows: usize },
    Spill { operator: &'static str },
}
