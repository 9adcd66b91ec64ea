//! Host-provided hooks (§6.2): the three things a host embeds the engine
//! into supplies beyond data access itself — whether an operation may run
//! at all, how to get credentials for it, and how to resolve a named
//! workbook table. All three have a documented "absence means X" default
//! so an engine embedded with no host at all still runs range/CSV-only
//! queries.

use pq_common::{PqError, Table};

use crate::credentials::Credentials;

/// `on_permission_request(kind, details) -> bool`; absence means "allow".
pub trait PermissionHook: Send + Sync {
    fn on_permission_request(&self, kind: &str, details: &serde_json::Value) -> bool;
}

/// Always allows. The default when a host registers no hook.
pub struct AllowAll;
impl PermissionHook for AllowAll {
    fn on_permission_request(&self, _kind: &str, _details: &serde_json::Value) -> bool {
        true
    }
}

/// `on_credential_request(connector_id, { request }) -> credentials | null`.
pub trait CredentialHook: Send + Sync {
    fn on_credential_request(
        &self,
        connector_id: &str,
        request: &serde_json::Value,
    ) -> Option<Credentials>;
}

/// Always returns an anonymous credential with no stable id — every source
/// using it becomes uncacheable per `pq-cache`'s `$cacheable` propagation.
pub struct AnonymousCredentials;
impl CredentialHook for AnonymousCredentials {
    fn on_credential_request(&self, _connector_id: &str, _request: &serde_json::Value) -> Option<Credentials> {
        Some(Credentials::anonymous())
    }
}

/// Resolves named workbook tables (`QuerySource::Table`). No default
/// implementation — a host that embeds workbook-table sources must supply
/// one; `get_table` failing is a `PqError::ConnectorFailure`, not a panic.
pub trait TableAdapter: Send + Sync {
    fn get_table(&self, name: &str) -> Result<Table, PqError>;
    /// A stable signature (e.g. a content hash) used for cache validation;
    /// `None` means this table can't be validated and is always re-read.
    fn get_table_signature(&self, name: &str) -> Option<String>;
}
