use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod http;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};

pub type TriggerId = String;
pub type ProcessId = String;
pub type Payload = Map<String, Value>;
pub type SharedTransport = Arc<dyn HttpTransport>;

/// Suffix every integration type name carries.
pub const INTEGRATION_SUFFIX: &str = "Integration";

/// Per-call adapter configuration.
///
/// Keys with a `null` value are treated as absent. There is no mutating
/// accessor; once a config is handed to an adapter it stays as it was.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrationConfig(BTreeMap<String, Value>);

impl IntegrationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Sets `key` only when the config does not already carry it.
    #[must_use]
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if self.get(&key).is_none() {
            self.0.insert(key, value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn base_url(&self) -> Option<&str> {
        self.get_str("base_url").filter(|s| !s.trim().is_empty())
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.get_str("auth_token").filter(|s| !s.is_empty())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.get_str("api_key").filter(|s| !s.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for IntegrationConfig {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for IntegrationConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Normalized outcome of `execute` and `get_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub process_id: Option<ProcessId>,
    pub status: String,
    #[serde(default)]
    pub data: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecutionResult {
    pub fn succeeded(process_id: Option<ProcessId>, status: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            process_id,
            status: status.into(),
            data,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    #[error("transport error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("configuration error for {integration}: {message}")]
    Configuration { integration: String, message: String },
    #[error(
        "integration type '{type_name}' not found in any of the expected locations: {}",
        searched.join(", ")
    )]
    NotFound {
        type_name: String,
        searched: Vec<String>,
    },
    #[error("type '{type_id}' does not implement the integration contract")]
    TypeMismatch { type_id: String },
    #[error("{integration} API error: {message}")]
    Api {
        integration: String,
        status: u16,
        message: String,
    },
    #[error("{context}: {source}")]
    Execution {
        context: String,
        #[source]
        source: Box<IntegrationError>,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl IntegrationError {
    pub fn configuration(integration: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            integration: integration.into(),
            message: message.into(),
        }
    }

    /// Wraps `self` with call-site context, keeping it reachable via `source()`.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Execution {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// HTTP status reported by the remote API, looking through context wrappers.
    pub fn api_status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Execution { source, .. } => source.api_status(),
            _ => None,
        }
    }
}

/// Uniform contract every adapter implements.
pub trait Integration: Send + Sync {
    /// Stable snake_case identifier used in log lines.
    fn name(&self) -> &str;

    fn execute(&self, trigger_id: &str, payload: &Payload)
    -> Result<ExecutionResult, IntegrationError>;

    fn get_status(&self, process_id: &str) -> Result<ExecutionResult, IntegrationError>;

    /// Best-effort; failures are logged and reported as `false`.
    fn cancel(&self, process_id: &str) -> bool;

    /// Advisory reachability probe; never fails.
    fn test_connection(&self) -> bool;
}

pub trait IntegrationFactory: Send + Sync {
    /// Canonical type name, e.g. `RestApiIntegration`.
    fn type_name(&self) -> &str;

    fn build(
        &self,
        config: IntegrationConfig,
        transport: SharedTransport,
    ) -> Result<Box<dyn Integration>, IntegrationError>;
}

pub type IntegrationCtor =
    fn(IntegrationConfig, SharedTransport) -> Result<Box<dyn Integration>, IntegrationError>;

/// Factory backed by a plain constructor function.
#[derive(Clone, Copy)]
pub struct FnFactory {
    type_name: &'static str,
    ctor: IntegrationCtor,
}

impl FnFactory {
    pub const fn new(type_name: &'static str, ctor: IntegrationCtor) -> Self {
        Self { type_name, ctor }
    }
}

impl IntegrationFactory for FnFactory {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn build(
        &self,
        config: IntegrationConfig,
        transport: SharedTransport,
    ) -> Result<Box<dyn Integration>, IntegrationError> {
        (self.ctor)(config, transport)
    }
}
