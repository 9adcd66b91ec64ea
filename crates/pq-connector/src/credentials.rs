//! Host-issued credentials (§6.2). A `credential_id` lets the engine fold
//! the credential into cache keys without ever embedding the secret
//! itself — see `pq-cache`'s signature derivation.

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Stable identifier for this credential, if the host issues one.
    /// `None` means the credential can't participate in a cache key at
    /// all, which `pq-cache` treats as "this source is uncacheable".
    pub credential_id: Option<String>,
    pub payload: serde_json::Value,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { credential_id: Some(id.into()), payload }
    }
}
