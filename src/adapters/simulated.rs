//! Simulated step executor.
//!
//! Stands in for an eventual AI-backed action: each step is a fixed delay
//! that resolves with a canned output line. Observes cancellation, and can
//! be configured to fail on steps whose name contains a marker, which the
//! tests use to exercise failure paths.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::models::agent::Agent;
use crate::domain::models::task::{AgentTask, TaskError, TaskStep};
use crate::domain::ports::StepExecutor;

/// Fixed-delay executor.
#[derive(Debug, Clone)]
pub struct SimulatedStepExecutor {
    delay: Duration,
    fail_on: Option<String>,
}

impl SimulatedStepExecutor {
    /// Executor resolving each step after `delay`.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_on: None,
        }
    }

    /// Fail any step whose name contains `marker`.
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_on = Some(marker.into());
        self
    }
}

impl Default for SimulatedStepExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(400))
    }
}

#[async_trait]
impl StepExecutor for SimulatedStepExecutor {
    async fn execute_step(
        &self,
        task: &AgentTask,
        step: &TaskStep,
        agent: Option<&Agent>,
        cancel: &CancellationToken,
    ) -> Result<String, TaskError> {
        tokio::select! {
            () = tokio::time::sleep(self.delay) => {}
            () = cancel.cancelled() => {
                return Err(TaskError::execution(format!(
                    "step '{}' cancelled",
                    step.name
                )));
            }
        }

        if let Some(marker) = &self.fail_on {
            if step.name.contains(marker.as_str()) {
                return Err(TaskError::execution(format!(
                    "simulated failure in step '{}'",
                    step.name
                )));
            }
        }

        let by = agent.map_or_else(String::new, |a| format!(" by {}", a.name));
        Ok(format!(
            "{}{} for task '{}'",
            step.name, by, task.description
        ))
    }
}
