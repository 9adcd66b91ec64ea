//! The result cache (C5, §4.7): deterministic cache keys over a query's
//! IR and its sources, TTL-backed storage, and source-state validation.
//! This crate knows nothing about `Table`/`Connector` — `pq-engine` builds
//! the JSON-safe inputs `key.rs` needs and owns the actual query-result
//! envelope that gets stored under a computed key.

pub mod clock;
pub mod key;
pub mod store;
pub mod validate;

pub use clock::{Clock, SystemClock, TestClock};
pub use key::{compute_cache_key, source_signature, CacheKeyInput, CacheKeyOptions, DependencySignature};
pub use store::{CacheEntry, CacheStore, InMemoryCacheStore, SetOptions};
pub use validate::{is_still_valid, SourceState};
