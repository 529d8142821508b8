use std::collections::BTreeMap;
use std::sync::Arc;

use dynint_api::{Integration, IntegrationConfig, IntegrationError, SharedTransport};
use dynint_core::{CatalogEntry, RegistrySettings};

use crate::registry::{IntegrationRegistry, RegistryBuilder};

/// Caller-facing entry point for obtaining adapters by name.
///
/// Cheap to clone; every clone shares one immutable registry.
#[derive(Debug, Clone)]
pub struct Integrations {
    registry: Arc<IntegrationRegistry>,
}

impl Integrations {
    pub fn new(registry: IntegrationRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Registry over the configured search paths with the shipped adapters
    /// registered into the default location.
    pub fn from_settings(settings: &RegistrySettings, transport: SharedTransport) -> Self {
        Self::new(
            RegistryBuilder::from_settings(settings)
                .register_builtins()
                .build(transport),
        )
    }

    /// Resolves `name` (`Foo` or `FooIntegration`) to a new adapter.
    pub fn call(
        &self,
        name: &str,
        config: IntegrationConfig,
    ) -> Result<Box<dyn Integration>, IntegrationError> {
        self.registry.resolve(name, config)
    }

    /// Same as [`Integrations::call`], for call sites naming the type directly.
    pub fn create(
        &self,
        type_name: &str,
        config: IntegrationConfig,
    ) -> Result<Box<dyn Integration>, IntegrationError> {
        self.call(type_name, config)
    }

    pub fn call_entry(&self, entry: &CatalogEntry) -> Result<Box<dyn Integration>, IntegrationError> {
        self.call(&entry.integration, entry.config.clone())
    }

    pub fn available(&self) -> BTreeMap<String, String> {
        self.registry.list_available()
    }

    pub fn registry(&self) -> &IntegrationRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use dynint_api::testing::ScriptedTransport;
    use dynint_api::Payload;
    use dynint_core::demo_catalog;
    use serde_json::json;

    use super::*;

    fn integrations(transport: Arc<ScriptedTransport>) -> Integrations {
        Integrations::from_settings(&RegistrySettings::default(), transport)
    }

    #[test]
    fn call_and_create_are_synonyms() {
        let dispatch = integrations(Arc::new(ScriptedTransport::new()));
        let cfg = IntegrationConfig::new().with("base_url", "https://example.test");

        let by_call = dispatch.call("RestApi", cfg.clone()).unwrap();
        let by_create = dispatch.create("RestApiIntegration", cfg).unwrap();
        assert_eq!(by_call.name(), by_create.name());
    }

    #[test]
    fn resolved_adapter_executes_through_registry_transport() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(200, &json!({"execution_id": "abc123", "status": "RUNNING"})),
        );
        let dispatch = integrations(transport.clone());
        let adapter = dispatch
            .call(
                "RestApi",
                IntegrationConfig::new().with("base_url", "https://example.test/hooks"),
            )
            .unwrap();

        let result = adapter.execute("nightly", &Payload::new()).unwrap();
        assert_eq!(result.process_id.as_deref(), Some("abc123"));
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn catalog_entries_resolve() {
        let dispatch = integrations(Arc::new(ScriptedTransport::new()));
        let catalog = demo_catalog();
        let entry = catalog.entry("local").unwrap();
        let adapter = dispatch.call_entry(entry).unwrap();
        assert_eq!(adapter.name(), "rest_api_integration");
    }

    #[test]
    fn missing_base_url_surfaces_through_facade() {
        let dispatch = integrations(Arc::new(ScriptedTransport::new()));
        assert!(matches!(
            dispatch.call("GcpApplication", IntegrationConfig::new().with("api_key", "k")),
            Err(IntegrationError::Configuration { .. })
        ));
    }

    #[test]
    fn clones_share_the_registry() {
        let dispatch = integrations(Arc::new(ScriptedTransport::new()));
        let other = dispatch.clone();
        assert!(std::ptr::eq(dispatch.registry(), other.registry()));
        assert_eq!(dispatch.available(), other.available());
        assert_eq!(dispatch.available().len(), 2);
    }
}
