//! Task runner boundary - the contract to the external agent execution
//! service.
//!
//! The scheduler treats the runner as opaque: it hands over a trigger, gets
//! back a result or a typed error, and enforces its own execution window
//! around the call.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{TaskResult, Trigger};

pub mod agent;

pub use agent::{AgentRunnerConfig, HttpAgentRunner};

/// Errors a runner call can produce
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The bounded execution window elapsed
    #[error("Run timed out after {0:?}")]
    Timeout(Duration),

    /// Transport failure reaching the execution service
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The service answered with something unusable
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The run was cancelled before completing
    #[error("Run cancelled")]
    Cancelled,
}

impl RunnerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunnerError::Timeout(_))
    }
}

/// Boundary contract to the agent execution service.
///
/// Implementations run one trigger's work to completion and report the
/// outcome; they never touch scheduler state.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, trigger: &Trigger) -> Result<TaskResult, RunnerError>;
}

/// Scriptable in-memory runner for tests.
#[derive(Default)]
pub struct MockRunner {
    failures: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make runs for this trigger fail with an invalid-response error.
    pub fn fail_trigger(&self, trigger_id: &str) {
        self.failures.lock().unwrap().insert(trigger_id.to_string());
    }

    /// Delay runs for this trigger, for exercising the execution window.
    pub fn delay_trigger(&self, trigger_id: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(trigger_id.to_string(), delay);
    }

    /// Trigger IDs run so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of runs for a specific trigger.
    pub fn call_count(&self, trigger_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == trigger_id)
            .count()
    }
}

#[async_trait]
impl TaskRunner for MockRunner {
    async fn run(&self, trigger: &Trigger) -> Result<TaskResult, RunnerError> {
        self.calls.lock().unwrap().push(trigger.id.clone());

        let delay = self.delays.lock().unwrap().get(&trigger.id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failures.lock().unwrap().contains(&trigger.id) {
            return Err(RunnerError::InvalidResponse(
                "mock runner failure".to_string(),
            ));
        }

        Ok(TaskResult::success(&trigger.id, "mock output", 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner_succeeds_by_default() {
        let runner = MockRunner::new();
        let trigger = Trigger::new_manual("Test", "do it");

        let result = runner.run(&trigger).await.unwrap();
        assert_eq!(result.trigger_id, trigger.id);
        assert_eq!(result.output, "mock output");
        assert_eq!(runner.call_count(&trigger.id), 1);
    }

    #[tokio::test]
    async fn test_mock_runner_scripted_failure() {
        let runner = MockRunner::new();
        let trigger = Trigger::new_manual("Test", "do it");
        runner.fail_trigger(&trigger.id);

        let err = runner.run(&trigger).await.unwrap_err();
        assert!(matches!(err, RunnerError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_mock_runner_records_call_order() {
        let runner = MockRunner::new();
        let a = Trigger::new_manual("A", "a");
        let b = Trigger::new_manual("B", "b");

        runner.run(&a).await.unwrap();
        runner.run(&b).await.unwrap();
        runner.run(&a).await.unwrap();

        assert_eq!(runner.calls(), vec![a.id.clone(), b.id.clone(), a.id.clone()]);
        assert_eq!(runner.call_count(&a.id), 2);
    }

    #[test]
    fn test_runner_error_is_timeout() {
        assert!(RunnerError::Timeout(Duration::from_secs(120)).is_timeout());
        assert!(!RunnerError::Cancelled.is_timeout());
        assert!(!RunnerError::InvalidResponse("x".to_string()).is_timeout());
    }

    #[test]
    fn test_runner_error_display() {
        let err = RunnerError::Timeout(Duration::from_secs(120));
        assert_eq!(err.to_string(), "Run timed out after 120s");
        assert_eq!(RunnerError::Cancelled.to_string(), "Run cancelled");
    }
}
