//! State and helpers shared by every adapter.
//!
//! Concrete adapters hold an [`IntegrationBase`] and route their requests,
//! response checks and log lines through it, so header construction, timeout
//! handling and error wrapping stay identical no matter which remote API an
//! adapter fronts.

use std::collections::BTreeMap;
use std::time::Duration;

use dynint_api::{
    HttpMethod, HttpRequest, HttpResponse, IntegrationConfig, IntegrationError, SharedTransport,
};
use serde_json::{Value, json};
use tracing::{Level, debug, error, info, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Largest accepted request timeout, one day.
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Timeout for reachability probes, independent of the configured timeout.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote statuses meaning the process already finished or never existed.
const ALREADY_FINISHED: [u16; 3] = [404, 409, 410];

pub struct IntegrationBase {
    name: String,
    base_url: String,
    headers: BTreeMap<String, String>,
    timeout: Duration,
    config: IntegrationConfig,
    transport: SharedTransport,
}

impl IntegrationBase {
    /// Validates `config` and derives headers and timeout.
    ///
    /// Fails before any network activity when `base_url` is missing or
    /// `timeout` is not a whole number of seconds in `1..=MAX_TIMEOUT_SECS`.
    pub fn new(
        name: impl Into<String>,
        config: IntegrationConfig,
        transport: SharedTransport,
    ) -> Result<Self, IntegrationError> {
        let name = name.into();
        let base_url = config
            .base_url()
            .ok_or_else(|| {
                IntegrationError::configuration(&name, format!("base URL is required for {name}"))
            })?
            .to_string();
        let timeout = timeout_from(&config).map_err(|m| IntegrationError::configuration(&name, m))?;
        let headers = prepare_headers(&config);

        debug!(integration = %name, base_url = %base_url, timeout_secs = timeout.as_secs(), "integration configured");

        Ok(Self {
            name,
            base_url,
            headers,
            timeout,
            config,
            transport,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn config(&self) -> &IntegrationConfig {
        &self.config
    }

    /// `base_url` joined with `path` by exactly one slash.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Request carrying the prepared headers and the configured timeout.
    pub fn request(&self, method: HttpMethod, url: impl Into<String>) -> HttpRequest {
        HttpRequest::new(method, url, self.timeout).with_headers(&self.headers)
    }

    /// Request carrying the prepared headers and [`HEALTH_CHECK_TIMEOUT`].
    pub fn probe_request(&self, url: impl Into<String>) -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, url, HEALTH_CHECK_TIMEOUT).with_headers(&self.headers)
    }

    pub fn send(&self, request: &HttpRequest) -> Result<HttpResponse, IntegrationError> {
        debug!(integration = %self.name, method = %request.method, url = %request.url, "sending request");
        Ok(self.transport.send(request)?)
    }

    /// Sends `request` and returns the decoded body of a successful response.
    pub fn call(&self, request: &HttpRequest) -> Result<Value, IntegrationError> {
        let response = self.send(request)?;
        self.validate_response(&response)
    }

    /// Decoded body (`null` when empty or not JSON) for 2xx responses.
    pub fn validate_response(&self, response: &HttpResponse) -> Result<Value, IntegrationError> {
        if response.is_success() {
            return Ok(response.json().unwrap_or(Value::Null));
        }
        Err(IntegrationError::Api {
            integration: self.name.clone(),
            status: response.status,
            message: error_message(response),
        })
    }

    /// Emits `[<name>] <message>` with `context` attached as a structured field.
    pub fn log(&self, level: Level, message: &str, context: &Value) {
        let name = self.name.as_str();
        if level == Level::ERROR {
            error!(integration = name, context = %context, "[{name}] {message}");
        } else if level == Level::WARN {
            warn!(integration = name, context = %context, "[{name}] {message}");
        } else if level == Level::INFO {
            info!(integration = name, context = %context, "[{name}] {message}");
        } else {
            debug!(integration = name, context = %context, "[{name}] {message}");
        }
    }

    /// Logs a failed `execute` and wraps the cause with the trigger id.
    pub fn execution_failed(&self, trigger_id: &str, cause: IntegrationError) -> IntegrationError {
        self.log(
            Level::ERROR,
            "execution failed",
            &json!({ "trigger_id": trigger_id, "error": cause.to_string() }),
        );
        cause.context(format!(
            "Failed to execute {} trigger '{trigger_id}'",
            self.name
        ))
    }

    /// Logs a failed `get_status` and wraps the cause with the process id.
    pub fn status_failed(&self, process_id: &str, cause: IntegrationError) -> IntegrationError {
        self.log(
            Level::ERROR,
            "failed to get status",
            &json!({ "process_id": process_id, "error": cause.to_string() }),
        );
        cause.context(format!("Failed to get status for process '{process_id}'"))
    }

    /// Logs a failed `cancel`; "already finished" answers only warrant a warning.
    pub fn cancel_failed(&self, process_id: &str, cause: &IntegrationError) -> bool {
        let context = json!({ "process_id": process_id, "error": cause.to_string() });
        match cause.api_status() {
            Some(status) if ALREADY_FINISHED.contains(&status) => {
                self.log(Level::WARN, "process already finished, nothing to cancel", &context);
            }
            _ => self.log(Level::ERROR, "failed to cancel process", &context),
        }
        false
    }

    pub fn connection_failed(&self, cause: &IntegrationError) -> bool {
        self.log(
            Level::ERROR,
            "connection test failed",
            &json!({ "error": cause.to_string() }),
        );
        false
    }
}

impl std::fmt::Debug for IntegrationBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationBase")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Default headers plus a bearer token from `auth_token`, else `api_key`.
pub fn prepare_headers(config: &IntegrationConfig) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::from([
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Accept".to_string(), "application/json".to_string()),
    ]);
    if let Some(token) = config.auth_token().or_else(|| config.api_key()) {
        headers.insert("Authorization".to_string(), format!("Bearer {token}"));
    }
    headers
}

pub fn default_config() -> IntegrationConfig {
    IntegrationConfig::new()
        .with("base_url", "")
        .with("timeout", DEFAULT_TIMEOUT_SECS)
}

/// First of `keys` present in `data` as a string or number.
pub fn first_present(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match data.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// `error.message`, then `message`, then `"Unknown error"`.
pub fn error_message(response: &HttpResponse) -> String {
    response
        .json_str("error.message")
        .or_else(|| response.json_str("message"))
        .unwrap_or_else(|| "Unknown error".to_string())
}

fn timeout_from(config: &IntegrationConfig) -> Result<Duration, String> {
    let secs = match config.get("timeout") {
        None => Some(DEFAULT_TIMEOUT_SECS),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    };
    match secs {
        Some(secs @ 1..=MAX_TIMEOUT_SECS) => Ok(Duration::from_secs(secs)),
        Some(secs) => Err(format!(
            "timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds, got {secs}"
        )),
        None => Err("timeout must be a whole number of seconds".to_string()),
    }
}
