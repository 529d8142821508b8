use dynint_api::{
    ExecutionResult, FnFactory, HttpMethod, Integration, IntegrationConfig, IntegrationError,
    Payload, SharedTransport,
};
use dynint_core::{IntegrationBase, first_present};
use serde_json::{Map, Value, json};
use tracing::Level;

pub(crate) const FACTORY: FnFactory = FnFactory::new(GcpApplicationIntegration::TYPE_NAME, build);

fn build(
    config: IntegrationConfig,
    transport: SharedTransport,
) -> Result<Box<dyn Integration>, IntegrationError> {
    Ok(Box::new(GcpApplicationIntegration::new(config, transport)?))
}

/// Google Cloud Application Integration API trigger.
///
/// The API has no status or cancel endpoint: status is reported as
/// `running` and cancellation is a logged no-op.
#[derive(Debug)]
pub struct GcpApplicationIntegration {
    base: IntegrationBase,
}

impl GcpApplicationIntegration {
    pub const NAME: &'static str = "gcp_application_integration";
    pub const TYPE_NAME: &'static str = "GcpApplicationIntegration";

    pub fn new(
        config: IntegrationConfig,
        transport: SharedTransport,
    ) -> Result<Self, IntegrationError> {
        Ok(Self {
            base: IntegrationBase::new(Self::NAME, config, transport)?,
        })
    }
}

impl Integration for GcpApplicationIntegration {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn execute(
        &self,
        trigger_id: &str,
        payload: &Payload,
    ) -> Result<ExecutionResult, IntegrationError> {
        self.base.log(
            Level::INFO,
            "executing GCP application integration",
            &json!({ "trigger_id": trigger_id, "payload_size": payload.len() }),
        );

        let request = self
            .base
            .request(HttpMethod::Post, self.base.base_url())
            .with_json(json!({
                "trigger_id": trigger_id,
                "input_parameters": format_payload(payload),
            }));
        let data = self
            .base
            .call(&request)
            .map_err(|e| self.base.execution_failed(trigger_id, e))?;

        let process_id = first_present(&data, &["execution_id", "process_id"]);
        self.base.log(
            Level::INFO,
            "GCP application integration executed successfully",
            &json!({ "trigger_id": trigger_id, "execution_id": process_id }),
        );

        let status = data
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("running")
            .to_string();
        Ok(ExecutionResult::succeeded(process_id, status, data))
    }

    fn get_status(&self, process_id: &str) -> Result<ExecutionResult, IntegrationError> {
        self.base.log(
            Level::INFO,
            "status not polled, reporting running",
            &json!({ "process_id": process_id }),
        );
        Ok(ExecutionResult::succeeded(
            Some(process_id.to_string()),
            "running",
            Value::Null,
        ))
    }

    fn cancel(&self, process_id: &str) -> bool {
        self.base.log(
            Level::INFO,
            "process cancelled",
            &json!({ "process_id": process_id }),
        );
        true
    }

    fn test_connection(&self) -> bool {
        let request = self.base.probe_request(self.base.base_url());
        match self.base.send(&request) {
            Ok(resp) => resp.status < 500,
            Err(e) => self.base.connection_failed(&e),
        }
    }
}

/// Wraps each payload value as a typed parameter value.
///
/// Objects and arrays become `{"jsonValue": "<json>"}`; everything else
/// becomes `{"stringValue": ...}` with strings passed through unquoted and
/// `null` as an empty string.
pub fn format_payload(payload: &Payload) -> Map<String, Value> {
    payload
        .iter()
        .map(|(key, value)| {
            let typed = match value {
                Value::Object(_) | Value::Array(_) => json!({ "jsonValue": value.to_string() }),
                Value::String(s) => json!({ "stringValue": s }),
                Value::Null => json!({ "stringValue": "" }),
                Value::Bool(_) | Value::Number(_) => json!({ "stringValue": value.to_string() }),
            };
            (key.clone(), typed)
        })
        .collect()
}
