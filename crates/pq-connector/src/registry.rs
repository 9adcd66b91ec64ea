//! Maps a connector id (`"file" | "http" | "odata" | "sql" | ...`, §6.1) to
//! its registered implementation. One registry is shared across a whole
//! `QueryExecutionSession` (§4.8).

use std::collections::HashMap;
use std::sync::Arc;

use pq_common::PqError;

use crate::Connector;

#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.insert(connector.id().to_string(), connector);
    }

    pub fn get(&self, id: &str) -> Result<&Arc<dyn Connector>, PqError> {
        self.connectors
            .get(id)
            .ok_or_else(|| PqError::connector_failure(id, format!("no connector registered for id '{id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticConnector;

    #[test]
    fn missing_connector_is_a_connector_failure() {
        let registry = ConnectorRegistry::new();
        assert!(registry.get("sql").is_err());
    }

    #[test]
    fn registered_connector_is_found_by_id() {
        let mut registry = ConnectorRegistry::new();
        registry.register(Arc::new(StaticConnector::empty("file")));
        assert!(registry.get("file").is_ok());
    }
}
