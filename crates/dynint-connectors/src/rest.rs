use dynint_api::{
    ExecutionResult, FnFactory, HttpMethod, Integration, IntegrationConfig, IntegrationError,
    Payload, SharedTransport,
};
use dynint_core::{IntegrationBase, first_present};
use serde_json::{Value, json};
use tracing::Level;

const PROCESS_ID_KEYS: [&str; 3] = ["execution_id", "process_id", "id"];

pub(crate) const FACTORY: FnFactory = FnFactory::new(RestApiIntegration::TYPE_NAME, build);

fn build(
    config: IntegrationConfig,
    transport: SharedTransport,
) -> Result<Box<dyn Integration>, IntegrationError> {
    Ok(Box::new(RestApiIntegration::new(config, transport)?))
}

/// Generic REST automation API.
///
/// Triggers with `POST {base_url}`, polls `GET {base_url}/status/{id}`,
/// cancels with `POST {base_url}/cancel/{id}` and probes `GET {base_url}/health`.
#[derive(Debug)]
pub struct RestApiIntegration {
    base: IntegrationBase,
}

impl RestApiIntegration {
    pub const NAME: &'static str = "rest_api_integration";
    pub const TYPE_NAME: &'static str = "RestApiIntegration";

    pub fn new(
        config: IntegrationConfig,
        transport: SharedTransport,
    ) -> Result<Self, IntegrationError> {
        Ok(Self {
            base: IntegrationBase::new(Self::NAME, config, transport)?,
        })
    }

    pub fn base(&self) -> &IntegrationBase {
        &self.base
    }
}

impl Integration for RestApiIntegration {
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
            "executing trigger",
            &json!({ "trigger_id": trigger_id, "payload_size": payload.len() }),
        );

        let request = self
            .base
            .request(HttpMethod::Post, self.base.base_url())
            .with_json(json!({ "trigger_id": trigger_id, "payload": payload }));
        let data = self
            .base
            .call(&request)
            .map_err(|e| self.base.execution_failed(trigger_id, e))?;

        let process_id = first_present(&data, &PROCESS_ID_KEYS);
        self.base.log(
            Level::INFO,
            "trigger executed successfully",
            &json!({ "trigger_id": trigger_id, "process_id": process_id }),
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
            "querying process status",
            &json!({ "process_id": process_id }),
        );

        let request = self.base.request(
            HttpMethod::Get,
            self.base.endpoint(&format!("status/{process_id}")),
        );
        let data = self
            .base
            .call(&request)
            .map_err(|e| self.base.status_failed(process_id, e))?;

        let status = data
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        self.base.log(
            Level::INFO,
            "process status retrieved",
            &json!({ "process_id": process_id, "status": status }),
        );

        let progress = data.get("progress").cloned().unwrap_or(Value::Null);
        Ok(
            ExecutionResult::succeeded(Some(process_id.to_string()), status, data)
                .with_extra("progress", progress),
        )
    }

    fn cancel(&self, process_id: &str) -> bool {
        let request = self.base.request(
            HttpMethod::Post,
            self.base.endpoint(&format!("cancel/{process_id}")),
        );
        match self.base.call(&request) {
            Ok(_) => {
                self.base.log(
                    Level::INFO,
                    "process cancelled",
                    &json!({ "process_id": process_id }),
                );
                true
            }
            Err(e) => self.base.cancel_failed(process_id, &e),
        }
    }

    fn test_connection(&self) -> bool {
        let request = self.base.probe_request(self.base.endpoint("health"));
        match self.base.send(&request) {
            Ok(resp) => resp.is_success(),
            Err(e) => self.base.connection_failed(&e),
        }
    }
}
