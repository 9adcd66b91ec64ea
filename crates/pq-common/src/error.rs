//! Domain error type for the query engine.
//!
//! One flat enum covers every fatal condition named in the spec's error
//! handling design: static contract violations (`UnknownColumn`,
//! `InvalidJoin`, ...), orchestration errors (`CycleError`, `UnknownQuery`),
//! host-hook failures (`PermissionDenied`, `CredentialUnavailable`), and
//! opaque connector failures. Per-row evaluation errors are *not* part of
//! this enum — those become `Value::Error` sentinels inside the data model
//! and never propagate as a `PqError`.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum PqError {
    #[error("cancelled")]
    Cancelled,

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("invalid join: {0}")]
    InvalidJoin(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown query: {0}")]
    UnknownQuery(String),

    #[error("cycle detected: {path}")]
    CycleError { path: String },

    #[error("permission denied for {kind}")]
    PermissionDenied { kind: String },

    #[error("credential unavailable for connector {connector_id}")]
    CredentialUnavailable { connector_id: String },

    #[error("connector '{connector_id}' failed: {message}")]
    ConnectorFailure {
        connector_id: String,
        message: String,
        #[source]
        cause: Option<ConnectorCause>,
    },

    #[error("privacy firewall blocked combining sources: {0}")]
    PrivacyBlocked(String),

    #[error("cache entry corrupted: {0}")]
    CacheCorruption(String),

    #[error("spill operation failed: {0}")]
    Spill(String),
}

/// Boxed, cloneable source error for `ConnectorFailure`. Connectors live
/// outside this crate and may report arbitrary error types; we only need
/// `Display` to surface a message, and `Clone` so `PqError` stays cloneable
/// (progress/diagnostic sinks pass errors by value).
#[derive(Debug, Clone)]
pub struct ConnectorCause(pub std::sync::Arc<str>);

impl fmt::Display for ConnectorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
impl std::error::Error for ConnectorCause {}

impl ConnectorCause {
    pub fn new(msg: impl fmt::Display) -> Self {
        Self(std::sync::Arc::from(msg.to_string().as_str()))
    }
}

impl PqError {
    pub fn connector_failure(connector_id: impl Into<String>, message: impl Into<String>) -> Self {
        PqError::ConnectorFailure {
            connector_id: connector_id.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PqError::Cancelled)
    }
}
