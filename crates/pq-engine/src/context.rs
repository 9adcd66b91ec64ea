//! The execution context `C = { tables, queries, queryResults, ... }` of
//! §4.8: everything a run of the engine needs that outlives any single
//! query, registered once by the host and shared across every
//! `Engine::execute` call (and, via `pq-orchestrator`, across a whole
//! refresh).

use std::collections::HashMap;
use std::sync::Arc;

use pq_cache::CacheStore;
use pq_common::{Query, QueryId};
use pq_connector::{AllowAll, AnonymousCredentials, ConnectorRegistry, CredentialHook, PermissionHook, TableAdapter};

use crate::privacy::PrivacyClassifier;

pub struct ExecutionContext {
    pub queries: HashMap<QueryId, Query>,
    pub connectors: ConnectorRegistry,
    pub permission_hook: Arc<dyn PermissionHook>,
    pub credential_hook: Arc<dyn CredentialHook>,
    pub table_adapter: Option<Arc<dyn TableAdapter>>,
    pub cache_store: Option<Arc<dyn CacheStore>>,
    pub privacy: PrivacyClassifier,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            queries: HashMap::new(),
            connectors: ConnectorRegistry::new(),
            permission_hook: Arc::new(AllowAll),
            credential_hook: Arc::new(AnonymousCredentials),
            table_adapter: None,
            cache_store: None,
            privacy: PrivacyClassifier::new(),
        }
    }

    pub fn register_query(&mut self, query: Query) {
        self.queries.insert(query.id.clone(), query);
    }

    pub fn query(&self, id: &str) -> Result<&Query, pq_common::PqError> {
        self.queries.get(id).ok_or_else(|| pq_common::PqError::UnknownQuery(id.to_string()))
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
