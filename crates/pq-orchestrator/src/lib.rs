//! The refresh orchestrator (C7, §4.9): computes the dependency DAG over
//! a set of registered queries, schedules them with a concurrency cap,
//! dedupes shared upstream results, detects cycles ahead of scheduling,
//! and supports cooperative cancellation.

pub mod events;
pub mod graph;
pub mod orchestrator;
pub mod scheduler;

pub use events::{noop_sink, RefreshEvent};
pub use graph::{build_graph, DependencyGraph};
pub use orchestrator::{RefreshOptions, RefreshOrchestrator, RefreshOutcome, RefreshReport};
pub use scheduler::JobOutcome;
