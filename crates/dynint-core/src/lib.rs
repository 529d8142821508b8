use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use dynint_api::IntegrationConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod base;

pub use base::{
    DEFAULT_TIMEOUT_SECS, HEALTH_CHECK_TIMEOUT, IntegrationBase, MAX_TIMEOUT_SECS, default_config,
    error_message, first_present, prepare_headers,
};

pub const CONFIG_FILE_NAME: &str = "integrations.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {path}: {message}")]
    Parse { path: String, message: String },
    #[error("validation error: {0}")]
    Validation(String),
}

/// Execution defaults applied to catalog entries.
///
/// `retry_attempts` and `retry_delay` are carried for callers that want to
/// build their own retry policy; adapters never retry on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionDefaults {
    pub timeout: u64,
    pub retry_attempts: u32,
    pub retry_delay: u64,
}

impl Default for ExecutionDefaults {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_SECS,
            retry_attempts: 3,
            retry_delay: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Location new adapters are registered into.
    pub default_location: String,
    /// Locations consulted in order when resolving a name.
    pub search_paths: Vec<String>,
    pub defaults: ExecutionDefaults,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_location: "app::integrations".to_string(),
            search_paths: vec![
                "app::integrations".to_string(),
                "app::services::integration".to_string(),
                "app::services::integrations".to_string(),
            ],
            defaults: ExecutionDefaults::default(),
        }
    }
}

/// A named, ready-to-resolve integration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    /// Symbolic integration name, e.g. `RestApi`.
    pub integration: String,
    pub config: IntegrationConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationCatalog {
    pub settings: RegistrySettings,
    pub integrations: BTreeMap<String, CatalogEntry>,
}

impl IntegrationCatalog {
    pub fn entry(&self, id: &str) -> Result<&CatalogEntry, ConfigError> {
        self.integrations.get(id).ok_or_else(|| {
            ConfigError::Validation(format!("integration entry {id} is not configured"))
        })
    }
}

pub fn validate_settings(settings: &RegistrySettings) -> Result<(), ConfigError> {
    if settings.search_paths.is_empty() {
        return Err(ConfigError::Validation(
            "search_paths must name at least one location".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    for location in &settings.search_paths {
        if location.trim().is_empty() {
            return Err(ConfigError::Validation(
                "search_paths contains an empty location".to_string(),
            ));
        }
        if !seen.insert(location.as_str()) {
            return Err(ConfigError::Validation(format!(
                "search path {location} is listed twice"
            )));
        }
    }
    if !seen.contains(settings.default_location.as_str()) {
        return Err(ConfigError::Validation(format!(
            "default_location {} is not one of the search paths",
            settings.default_location
        )));
    }
    if !(1..=MAX_TIMEOUT_SECS).contains(&settings.defaults.timeout) {
        return Err(ConfigError::Validation(format!(
            "defaults.timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds"
        )));
    }
    Ok(())
}

pub fn validate_catalog(catalog: &IntegrationCatalog) -> Result<(), ConfigError> {
    validate_settings(&catalog.settings)?;
    for (id, entry) in &catalog.integrations {
        if entry.integration.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "integration entry {id} does not name an integration type"
            )));
        }
    }
    Ok(())
}

pub fn demo_catalog() -> IntegrationCatalog {
    let entry = CatalogEntry {
        id: "local".to_string(),
        integration: "RestApi".to_string(),
        config: IntegrationConfig::new()
            .with("base_url", "http://127.0.0.1:8787/hooks")
            .with("timeout", DEFAULT_TIMEOUT_SECS),
    };

    IntegrationCatalog {
        settings: RegistrySettings::default(),
        integrations: BTreeMap::from([(entry.id.clone(), entry)]),
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    default_location: Option<String>,
    #[serde(default)]
    search_paths: Option<Vec<String>>,
    #[serde(default)]
    defaults: ExecutionDefaults,
    #[serde(default)]
    integrations: BTreeMap<String, RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "type")]
    integration: String,
    #[serde(flatten)]
    config: BTreeMap<String, Value>,
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("dynint")
    } else {
        PathBuf::from(".dynint")
    }
}

pub fn load_catalog_from_dir(dir: &Path) -> Result<IntegrationCatalog, ConfigError> {
    load_catalog_from_file(&dir.join(CONFIG_FILE_NAME))
}

pub fn load_catalog_from_file(path: &Path) -> Result<IntegrationCatalog, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_catalog(&content).map_err(|e| match e {
        ConfigError::Parse { message, .. } => ConfigError::Parse {
            path: path.display().to_string(),
            message,
        },
        other => other,
    })
}

pub fn parse_catalog(content: &str) -> Result<IntegrationCatalog, ConfigError> {
    let raw: RawCatalog = toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: "<inline>".to_string(),
        message: e.to_string(),
    })?;

    let defaults = RegistrySettings::default();
    let search_paths = raw.search_paths.unwrap_or(defaults.search_paths);
    let default_location = raw
        .default_location
        .or_else(|| search_paths.first().cloned())
        .unwrap_or(defaults.default_location);
    let settings = RegistrySettings {
        default_location,
        search_paths,
        defaults: raw.defaults,
    };

    let integrations = raw
        .integrations
        .into_iter()
        .map(|(id, entry)| {
            let config = IntegrationConfig::from(entry.config)
                .with_default("timeout", settings.defaults.timeout);
            (
                id.clone(),
                CatalogEntry {
                    id,
                    integration: entry.integration,
                    config,
                },
            )
        })
        .collect();

    let catalog = IntegrationCatalog {
        settings,
        integrations,
    };
    validate_catalog(&catalog)?;
    Ok(catalog)
}

/// Writes the default config file into `dir` unless one already exists.
pub fn write_default_config_files(dir: &Path) -> Result<PathBuf, ConfigError> {
    fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        fs::write(
            &path,
            include_str!("../../../docs/dynint/integrations.toml.example"),
        )
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_entries_and_applies_defaults() {
        let catalog = parse_catalog(
            r#"
            search_paths = ["app::integrations", "vendor::integrations"]

            [defaults]
            timeout = 12

            [integrations.orders]
            type = "RestApi"
            base_url = "https://hooks.example.test"
            auth_token = "secret"

            [integrations.gcp]
            type = "GcpApplicationIntegration"
            base_url = "https://integrations.googleapis.test"
            timeout = 60
            region = "europe-west1"
            "#,
        )
        .unwrap();

        assert_eq!(catalog.settings.default_location, "app::integrations");
        assert_eq!(catalog.settings.defaults.retry_attempts, 3);

        let orders = catalog.entry("orders").unwrap();
        assert_eq!(orders.integration, "RestApi");
        assert_eq!(orders.config.get("timeout"), Some(&json!(12)));
        assert_eq!(orders.config.auth_token(), Some("secret"));

        let gcp = catalog.entry("gcp").unwrap();
        assert_eq!(gcp.config.get("timeout"), Some(&json!(60)));
        assert_eq!(gcp.config.get_str("region"), Some("europe-west1"));
        assert!(catalog.entry("missing").is_err());
    }

    #[test]
    fn rejects_unknown_default_location() {
        let err = parse_catalog(
            r#"
            default_location = "elsewhere"
            search_paths = ["app::integrations"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_duplicate_search_paths() {
        let settings = RegistrySettings {
            search_paths: vec!["a".into(), "a".into()],
            default_location: "a".into(),
            ..RegistrySettings::default()
        };
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn rejects_zero_default_timeout() {
        let err = parse_catalog(
            r#"
            [defaults]
            timeout = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn empty_file_yields_defaults() {
        let catalog = parse_catalog("").unwrap();
        assert_eq!(catalog.settings, RegistrySettings::default());
        assert!(catalog.integrations.is_empty());
    }

    #[test]
    fn default_files_round_trip_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_default_config_files(dir.path()).unwrap();
        assert!(path.exists());

        let catalog = load_catalog_from_dir(dir.path()).unwrap();
        assert_eq!(catalog.settings.search_paths.len(), 3);
        assert!(!catalog.integrations.is_empty());

        fs::write(&path, "search_paths = []").unwrap();
        write_default_config_files(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "search_paths = []");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_catalog_from_dir(dir.path()),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn demo_catalog_is_valid() {
        validate_catalog(&demo_catalog()).unwrap();
    }
}
