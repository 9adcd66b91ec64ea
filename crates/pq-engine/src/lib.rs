//! The query execution engine (C6): `Engine::execute` runs one query
//! through folding, source loading, the operator library, and the result
//! cache, per the 8-step flow of §4.8.

pub mod context;
pub mod engine;
pub mod options;
pub mod privacy;
pub mod progress;
pub mod result;
pub mod session;

pub use context::ExecutionContext;
pub use engine::Engine;
pub use options::{CacheMode, ExecutionOptions, ValidationMode};
pub use privacy::{PrivacyClassifier, PrivacyLevel};
pub use progress::{noop_sink, ProgressEvent};
pub use result::QueryExecutionResult;
pub use session::QueryExecutionSession;
