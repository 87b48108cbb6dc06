//! Ports: capabilities the embedding application supplies.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::models::agent::Agent;
use super::models::task::{AgentTask, TaskError, TaskStep};

/// Capability that performs the actual work of one step.
///
/// The scheduler has no opinion on what a step does; it only requires that
/// execution eventually resolves with opaque output or rejects with an
/// error. Implementations should observe `cancel` and stop early when it
/// fires; the scheduler discards a step's late result against a task that
/// has already reached a terminal state either way.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Execute one step of a task, optionally on behalf of an agent.
    async fn execute_step(
        &self,
        task: &AgentTask,
        step: &TaskStep,
        agent: Option<&Agent>,
        cancel: &CancellationToken,
    ) -> Result<String, TaskError>;
}
