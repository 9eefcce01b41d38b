//! HTTP adapter to the local agent execution service.
//!
//! POSTs the trigger's prompt to a configured endpoint and maps the JSON
//! response into a task result. Transport and protocol failures become typed
//! RunnerError values; the scheduler decides what to do with them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::domain::{TaskResult, Trigger};
use crate::runner::{RunnerError, TaskRunner};

/// Configuration for the HTTP agent runner
#[derive(Debug, Clone)]
pub struct AgentRunnerConfig {
    /// Endpoint accepting run requests
    pub endpoint: String,
    /// Client-side request timeout
    pub timeout: Duration,
}

impl Default for AgentRunnerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8675/v1/runs".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// HTTP client for the agent execution service
pub struct HttpAgentRunner {
    client: Client,
    config: AgentRunnerConfig,
}

impl HttpAgentRunner {
    /// Create a new runner against the configured endpoint
    pub fn new(config: AgentRunnerConfig) -> Result<Self, RunnerError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Build the request body for a run
    fn build_request(&self, trigger: &Trigger) -> Value {
        json!({
            "trigger_id": trigger.id,
            "name": trigger.name,
            "prompt": trigger.prompt,
        })
    }

    /// Parse the service response into a task result
    fn parse_response(&self, trigger: &Trigger, body: &Value) -> Result<TaskResult, RunnerError> {
        let output = body
            .get("output")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                RunnerError::InvalidResponse("response missing 'output' field".to_string())
            })?;

        let cost_usd = body
            .get("cost_usd")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        Ok(TaskResult::success(&trigger.id, output, cost_usd))
    }
}

#[async_trait]
impl TaskRunner for HttpAgentRunner {
    async fn run(&self, trigger: &Trigger) -> Result<TaskResult, RunnerError> {
        let request = self.build_request(trigger);

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RunnerError::Timeout(self.config.timeout)
                } else {
                    RunnerError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RunnerError::InvalidResponse(format!(
                "status {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RunnerError::InvalidResponse(format!("bad JSON body: {}", e)))?;

        self.parse_response(trigger, &body)
    }
}
