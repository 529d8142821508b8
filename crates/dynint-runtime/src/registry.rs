//! Name-to-adapter resolution across ordered search locations.
//!
//! Adapters are registered explicitly at startup, each into a named location.
//! Resolution walks the locations in the order they were declared and stops
//! at the first one that knows the canonical type name, so precedence is a
//! property of registration order rather than of any runtime scan.

use std::collections::BTreeMap;
use std::sync::Arc;

use dynint_api::{
    INTEGRATION_SUFFIX, Integration, IntegrationConfig, IntegrationError, IntegrationFactory,
    SharedTransport,
};
use dynint_connectors::BUILTIN_FACTORIES;
use dynint_core::RegistrySettings;
use tracing::{debug, warn};

/// Location used when a builder has not been told about any.
pub const DEFAULT_LOCATION: &str = "app::integrations";

/// Name of the contract's base type, registered as abstract.
pub const BASE_TYPE_NAME: &str = "ApplicationIntegration";

/// Appends the `Integration` suffix unless `name` already carries it.
pub fn canonical_type_name(name: &str) -> String {
    if name.ends_with(INTEGRATION_SUFFIX) {
        name.to_string()
    } else {
        format!("{name}{INTEGRATION_SUFFIX}")
    }
}

/// Inverse of [`canonical_type_name`] for listing purposes.
pub fn symbolic_name(type_name: &str) -> &str {
    type_name
        .strip_suffix(INTEGRATION_SUFFIX)
        .unwrap_or(type_name)
}

#[derive(Clone)]
pub enum TypeEntry {
    /// Implements the integration contract.
    Concrete(Arc<dyn IntegrationFactory>),
    /// The contract's base type; never instantiable.
    Abstract,
    /// Known to the location but not an integration.
    Foreign { kind: String },
}

impl std::fmt::Debug for TypeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concrete(factory) => f.debug_tuple("Concrete").field(&factory.type_name()).finish(),
            Self::Abstract => f.write_str("Abstract"),
            Self::Foreign { kind } => f.debug_struct("Foreign").field("kind", kind).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchLocation {
    name: String,
    types: BTreeMap<String, TypeEntry>,
}

impl SearchLocation {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified identifier of `type_name` within this location.
    pub fn type_id(&self, type_name: &str) -> String {
        format!("{}::{type_name}", self.name)
    }

    pub fn get(&self, type_name: &str) -> Option<&TypeEntry> {
        self.types.get(type_name)
    }

    pub fn types(&self) -> impl Iterator<Item = (&String, &TypeEntry)> {
        self.types.iter()
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    locations: Vec<SearchLocation>,
    default_location: Option<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the configured locations in order and picks the default one.
    pub fn from_settings(settings: &RegistrySettings) -> Self {
        settings
            .search_paths
            .iter()
            .fold(Self::new(), |builder, location| builder.location(location))
            .default_location(&settings.default_location)
    }

    /// Appends `name` to the search order unless already declared.
    #[must_use]
    pub fn location(mut self, name: impl Into<String>) -> Self {
        self.location_index(&name.into());
        self
    }

    #[must_use]
    pub fn default_location(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.location_index(&name);
        self.default_location = Some(name);
        self
    }

    /// Registers `factory` into the default location.
    #[must_use]
    pub fn register(self, factory: impl IntegrationFactory + 'static) -> Self {
        let location = self.target_location();
        self.register_in(location, factory)
    }

    #[must_use]
    pub fn register_in(
        mut self,
        location: impl Into<String>,
        factory: impl IntegrationFactory + 'static,
    ) -> Self {
        let type_name = factory.type_name().to_string();
        self.insert(&location.into(), type_name, TypeEntry::Concrete(Arc::new(factory)));
        self
    }

    #[must_use]
    pub fn register_abstract(
        mut self,
        location: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        self.insert(&location.into(), type_name.into(), TypeEntry::Abstract);
        self
    }

    #[must_use]
    pub fn register_foreign(
        mut self,
        location: impl Into<String>,
        type_name: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        self.insert(
            &location.into(),
            type_name.into(),
            TypeEntry::Foreign { kind: kind.into() },
        );
        self
    }

    /// Registers the shipped adapters and the abstract base type into the
    /// default location.
    #[must_use]
    pub fn register_builtins(self) -> Self {
        let location = self.target_location();
        BUILTIN_FACTORIES
            .into_iter()
            .fold(self, |builder, factory| builder.register_in(location.clone(), factory))
            .register_abstract(location, BASE_TYPE_NAME)
    }

    pub fn build(self, transport: SharedTransport) -> IntegrationRegistry {
        debug!(
            locations = ?self.locations.iter().map(SearchLocation::name).collect::<Vec<_>>(),
            "integration registry built"
        );
        IntegrationRegistry {
            locations: self.locations,
            transport,
        }
    }

    fn target_location(&self) -> String {
        self.default_location
            .clone()
            .or_else(|| self.locations.first().map(|l| l.name.clone()))
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string())
    }

    fn location_index(&mut self, name: &str) -> usize {
        if let Some(idx) = self.locations.iter().position(|l| l.name == name) {
            return idx;
        }
        self.locations.push(SearchLocation::new(name));
        self.locations.len() - 1
    }

    fn insert(&mut self, location: &str, type_name: String, entry: TypeEntry) {
        let idx = self.location_index(location);
        let slot = &mut self.locations[idx];
        if slot.types.contains_key(&type_name) {
            warn!(location = %location, type_name = %type_name, "replacing previously registered type");
        }
        debug!(location = %location, type_name = %type_name, entry = ?entry, "registered type");
        slot.types.insert(type_name, entry);
    }
}

/// Immutable name-to-adapter resolver; share it behind an `Arc`.
pub struct IntegrationRegistry {
    locations: Vec<SearchLocation>,
    transport: SharedTransport,
}

impl IntegrationRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Resolves `name` to a freshly built adapter configured with `config`.
    pub fn resolve(
        &self,
        name: &str,
        config: IntegrationConfig,
    ) -> Result<Box<dyn Integration>, IntegrationError> {
        let type_name = canonical_type_name(name);

        let Some((location, entry)) = self.find(&type_name) else {
            debug!(name = %name, type_name = %type_name, "integration type not found");
            return Err(IntegrationError::NotFound {
                type_name,
                searched: self.location_names(),
            });
        };

        let type_id = location.type_id(&type_name);
        match entry {
            TypeEntry::Concrete(factory) => {
                debug!(name = %name, type_id = %type_id, "resolved integration");
                factory.build(config, Arc::clone(&self.transport))
            }
            TypeEntry::Abstract | TypeEntry::Foreign { .. } => {
                Err(IntegrationError::TypeMismatch { type_id })
            }
        }
    }

    /// Symbolic name → fully-qualified type identifier for every
    /// instantiable type. Earlier locations shadow later ones.
    pub fn list_available(&self) -> BTreeMap<String, String> {
        let mut available = BTreeMap::new();
        for location in &self.locations {
            for (type_name, entry) in location.types() {
                if let TypeEntry::Concrete(_) = entry {
                    available
                        .entry(symbolic_name(type_name).to_string())
                        .or_insert_with(|| location.type_id(type_name));
                }
            }
        }
        available
    }

    pub fn locations(&self) -> &[SearchLocation] {
        &self.locations
    }

    pub fn location_names(&self) -> Vec<String> {
        self.locations.iter().map(|l| l.name.clone()).collect()
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    fn find(&self, type_name: &str) -> Option<(&SearchLocation, &TypeEntry)> {
        self.locations
            .iter()
            .find_map(|location| location.get(type_name).map(|entry| (location, entry)))
    }
}

impl std::fmt::Debug for IntegrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationRegistry")
            .field("locations", &self.locations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use dynint_api::testing::ScriptedTransport;
    use dynint_api::{ExecutionResult, Payload};
    use serde_json::Value;

    use super::*;

    /// Adapter that reports which factory built it.
    struct Tagged {
        tag: String,
    }

    impl Integration for Tagged {
        fn name(&self) -> &str {
            &self.tag
        }

        fn execute(&self, _: &str, _: &Payload) -> Result<ExecutionResult, IntegrationError> {
            Ok(ExecutionResult::succeeded(None, "running", Value::Null))
        }

        fn get_status(&self, id: &str) -> Result<ExecutionResult, IntegrationError> {
            Ok(ExecutionResult::succeeded(Some(id.into()), "running", Value::Null))
        }

        fn cancel(&self, _: &str) -> bool {
            true
        }

        fn test_connection(&self) -> bool {
            true
        }
    }

    struct TaggedFactory {
        type_name: &'static str,
        tag: &'static str,
    }

    impl IntegrationFactory for TaggedFactory {
        fn type_name(&self) -> &str {
            self.type_name
        }

        fn build(
            &self,
            config: IntegrationConfig,
            _: SharedTransport,
        ) -> Result<Box<dyn Integration>, IntegrationError> {
            if config.base_url().is_none() {
                return Err(IntegrationError::configuration(self.tag, "base URL is required"));
            }
            Ok(Box::new(Tagged {
                tag: self.tag.to_string(),
            }))
        }
    }

    fn foo(tag: &'static str) -> TaggedFactory {
        TaggedFactory {
            type_name: "FooIntegration",
            tag,
        }
    }

    fn cfg() -> IntegrationConfig {
        IntegrationConfig::new().with("base_url", "https://example.test")
    }

    fn transport() -> SharedTransport {
        Arc::new(ScriptedTransport::new())
    }

    #[test]
    fn canonical_names() {
        assert_eq!(canonical_type_name("Foo"), "FooIntegration");
        assert_eq!(canonical_type_name("FooIntegration"), "FooIntegration");
        assert_eq!(canonical_type_name(&canonical_type_name("Foo")), "FooIntegration");
        assert_eq!(symbolic_name("FooIntegration"), "Foo");
        assert_eq!(symbolic_name("Helper"), "Helper");
    }

    #[test]
    fn suffixed_and_bare_names_reach_the_same_type() {
        let registry = RegistryBuilder::new().register(foo("a")).build(transport());
        assert_eq!(registry.resolve("Foo", cfg()).unwrap().name(), "a");
        assert_eq!(registry.resolve("FooIntegration", cfg()).unwrap().name(), "a");
    }

    #[test]
    fn first_location_wins() {
        let registry = RegistryBuilder::new()
            .location("A")
            .location("B")
            .register_in("B", foo("from-b"))
            .register_in("A", foo("from-a"))
            .build(transport());

        assert_eq!(registry.resolve("Foo", cfg()).unwrap().name(), "from-a");
        assert_eq!(
            registry.list_available().get("Foo").map(String::as_str),
            Some("A::FooIntegration")
        );
    }

    #[test]
    fn later_location_used_when_earlier_lacks_type() {
        let registry = RegistryBuilder::new()
            .location("A")
            .register_in("B", foo("from-b"))
            .build(transport());
        assert_eq!(registry.resolve("Foo", cfg()).unwrap().name(), "from-b");
    }

    #[test]
    fn not_found_lists_every_location_in_order() {
        let registry = RegistryBuilder::new()
            .location("app::integrations")
            .location("app::services::integration")
            .location("app::services::integrations")
            .build(transport());

        let Err(err) = registry.resolve("Missing", cfg()) else {
            panic!("resolving an unregistered name must fail");
        };
        match &err {
            IntegrationError::NotFound { type_name, searched } => {
                assert_eq!(type_name, "MissingIntegration");
                assert_eq!(
                    searched,
                    &[
                        "app::integrations",
                        "app::services::integration",
                        "app::services::integrations"
                    ]
                );
            }
            other => panic!("expected not found, got {other:?}"),
        }
        assert!(err.to_string().ends_with(
            "app::integrations, app::services::integration, app::services::integrations"
        ));
    }

    #[test]
    fn non_contract_types_are_a_mismatch() {
        let registry = RegistryBuilder::new()
            .location("A")
            .register_foreign("A", "ReportIntegration", "struct")
            .register_abstract("A", BASE_TYPE_NAME)
            .build(transport());

        for (name, type_id) in [
            ("Report", "A::ReportIntegration"),
            ("Application", "A::ApplicationIntegration"),
        ] {
            match registry.resolve(name, cfg()) {
                Err(IntegrationError::TypeMismatch { type_id: got }) => assert_eq!(got, type_id),
                Err(other) => panic!("expected type mismatch, got {other:?}"),
                Ok(_) => panic!("expected type mismatch for {name}"),
            }
        }
        assert!(registry.list_available().is_empty());
    }

    #[test]
    fn foreign_type_in_first_location_shadows_later_concrete() {
        let registry = RegistryBuilder::new()
            .register_foreign("A", "FooIntegration", "helper")
            .register_in("B", foo("from-b"))
            .build(transport());
        assert!(matches!(
            registry.resolve("Foo", cfg()),
            Err(IntegrationError::TypeMismatch { .. })
        ));
        assert_eq!(
            registry.list_available().get("Foo").map(String::as_str),
            Some("B::FooIntegration")
        );
    }

    #[test]
    fn construction_errors_propagate_unchanged() {
        let registry = RegistryBuilder::new().register(foo("a")).build(transport());
        match registry.resolve("Foo", IntegrationConfig::new()) {
            Err(IntegrationError::Configuration { integration, .. }) => assert_eq!(integration, "a"),
            Err(other) => panic!("expected configuration error, got {other:?}"),
            Ok(_) => panic!("expected configuration error"),
        }
    }

    #[test]
    fn builtins_follow_settings() {
        let settings = RegistrySettings {
            default_location: "app::services::integrations".into(),
            ..RegistrySettings::default()
        };
        let registry = RegistryBuilder::from_settings(&settings)
            .register_builtins()
            .build(transport());

        assert_eq!(registry.location_names(), settings.search_paths);
        let available = registry.list_available();
        assert_eq!(
            available.get("RestApi").map(String::as_str),
            Some("app::services::integrations::RestApiIntegration")
        );
        assert_eq!(
            available.get("GcpApplication").map(String::as_str),
            Some("app::services::integrations::GcpApplicationIntegration")
        );
        assert!(!available.contains_key("Application"));
    }

    #[test]
    fn builder_without_locations_uses_default() {
        let registry = RegistryBuilder::new().register_builtins().build(transport());
        assert_eq!(registry.location_names(), vec![DEFAULT_LOCATION.to_string()]);
        let rest = registry.resolve("RestApi", cfg()).unwrap();
        assert_eq!(rest.name(), "rest_api_integration");
    }
}
