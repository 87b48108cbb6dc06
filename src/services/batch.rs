//! Parallel batch executor.
//!
//! Alternative entry point for "run this batch as fast as possible"
//! requests. Tasks go onto an executor-local FIFO queue (fully independent
//! of the orchestrator's priority queue); a drain loop pairs each task with
//! an agent from the pool and spawns its step execution, so the pool bound
//! is the parallelism bound. When the pool is exhausted the head task is
//! pushed back to the front and the loop parks on the pool's release
//! notification with a fixed backoff fallback.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::events::{EventBus, TaskEvent};
use crate::domain::models::agent::{Agent, AgentRole};
use crate::domain::models::task::{
    AgentTask, TaskMetrics, TaskResult, TaskState, TaskStatus, TaskStep, TaskType,
};
use crate::domain::ports::StepExecutor;
use crate::services::analyzer::DependencyAnalyzer;
use crate::services::planner::ExecutionPlanner;
use crate::services::pool::AgentPool;
use crate::services::steps;

/// Default backoff while the pool is exhausted. A release notification
/// short-circuits the wait.
pub const DEFAULT_ACQUIRE_BACKOFF: Duration = Duration::from_millis(100);

struct BatchState {
    statuses: HashMap<Uuid, TaskStatus>,
    queue: VecDeque<Uuid>,
    /// Task id -> agent currently bound to it.
    bindings: HashMap<Uuid, Uuid>,
    cancel_tokens: HashMap<Uuid, CancellationToken>,
    draining: bool,
}

struct Inner {
    state: Mutex<BatchState>,
    pool: Arc<AgentPool>,
    executor: Arc<dyn StepExecutor>,
    bus: EventBus,
    backoff: Duration,
}

/// FIFO batch executor backed by the agent pool.
pub struct BatchExecutor {
    inner: Arc<Inner>,
}

impl BatchExecutor {
    pub fn new(pool: Arc<AgentPool>, executor: Arc<dyn StepExecutor>, bus: EventBus) -> Self {
        Self::with_backoff(pool, executor, bus, DEFAULT_ACQUIRE_BACKOFF)
    }

    /// Create an executor with a custom exhaustion backoff.
    pub fn with_backoff(
        pool: Arc<AgentPool>,
        executor: Arc<dyn StepExecutor>,
        bus: EventBus,
        backoff: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BatchState {
                    statuses: HashMap::new(),
                    queue: VecDeque::new(),
                    bindings: HashMap::new(),
                    cancel_tokens: HashMap::new(),
                    draining: false,
                }),
                pool,
                executor,
                bus,
                backoff,
            }),
        }
    }

    /// Submit a batch of tasks in the given order. Returns their ids.
    #[instrument(skip_all, fields(task_count = tasks.len()))]
    pub async fn submit_batch(&self, tasks: Vec<AgentTask>) -> DomainResult<Vec<Uuid>> {
        for task in &tasks {
            task.validate()?;
        }
        let mut ids = Vec::with_capacity(tasks.len());
        {
            let mut state = self.inner.state.lock().await;
            for task in tasks {
                let id = task.id;
                let status = TaskStatus::new(task);
                state.statuses.insert(id, status.clone());
                state.queue.push_back(id);
                ids.push(id);
                // Published under the lock so no later transition can be
                // delivered before this one.
                self.inner.publish(TaskEvent::Submitted { status }).await;
            }
        }
        info!(count = ids.len(), "batch submitted");
        self.ensure_draining().await;
        Ok(ids)
    }

    /// Analyze dependencies, plan layers, and submit the batch in layer
    /// order (each layer's tasks are queued before any later layer's).
    pub async fn submit_planned(&self, tasks: Vec<AgentTask>) -> DomainResult<Vec<Uuid>> {
        let graph = DependencyAnalyzer::new().analyze(&tasks);
        let plan = ExecutionPlanner::new().plan(&graph)?;
        let by_id: HashMap<Uuid, AgentTask> = tasks.into_iter().map(|t| (t.id, t)).collect();
        let ordered: Vec<AgentTask> = plan
            .flatten()
            .into_iter()
            .filter_map(|id| by_id.get(&id).cloned())
            .collect();
        self.submit_batch(ordered).await
    }

    /// Status snapshot for one task.
    pub async fn get_status(&self, task_id: Uuid) -> Option<TaskStatus> {
        let state = self.inner.state.lock().await;
        state.statuses.get(&task_id).cloned()
    }

    /// Cancel a task: drop it from the queue if pending, mark it
    /// CANCELLED, and release (not error) any agent bound to it. Returns
    /// false on unknown or terminal tasks.
    #[instrument(skip(self))]
    pub async fn cancel(&self, task_id: Uuid) -> bool {
        let agent_id = {
            let mut state = self.inner.state.lock().await;
            let Some(status) = state.statuses.get_mut(&task_id) else {
                return false;
            };
            if status.is_terminal() || status.transition_to(TaskState::Cancelled).is_err() {
                return false;
            }
            let snapshot = status.clone();
            state.queue.retain(|id| *id != task_id);
            if let Some(token) = state.cancel_tokens.remove(&task_id) {
                token.cancel();
            }
            let agent_id = state.bindings.remove(&task_id);
            self.inner.publish(TaskEvent::Updated { status: snapshot }).await;
            agent_id
        };
        if let Some(agent_id) = agent_id {
            self.inner.pool.release(agent_id).await;
        }
        info!(%task_id, "batch task cancelled");
        true
    }

    /// Start the drain loop if it is not already running.
    async fn ensure_draining(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if state.draining {
                return;
            }
            state.draining = true;
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            drain(inner).await;
        });
    }
}

impl Inner {
    async fn publish(&self, event: TaskEvent) {
        self.bus.emit(event);
    }
}

/// Drain the FIFO queue, pairing tasks with agents.
async fn drain(inner: Arc<Inner>) {
    loop {
        let task_id = {
            let mut state = inner.state.lock().await;
            match state.queue.pop_front() {
                Some(id) => id,
                None => {
                    state.draining = false;
                    break;
                }
            }
        };

        // Skip tasks cancelled while queued.
        let preferred_role = {
            let state = inner.state.lock().await;
            match state.statuses.get(&task_id) {
                Some(status) if status.state == TaskState::Pending => {
                    preferred_role_for(status.task.task_type)
                }
                _ => continue,
            }
        };

        let Some(agent) = inner.pool.acquire(preferred_role).await else {
            // Pool exhausted: requeue at the front and wait for a release,
            // with a fixed backoff as fallback. Never an undelayed loop.
            debug!(%task_id, "agent pool exhausted, backing off");
            {
                let mut state = inner.state.lock().await;
                state.queue.push_front(task_id);
            }
            tokio::select! {
                () = inner.pool.wait_released() => {}
                () = tokio::time::sleep(inner.backoff) => {}
            }
            continue;
        };

        let token = {
            let mut state = inner.state.lock().await;
            let Some(status) = state.statuses.get_mut(&task_id) else {
                inner.pool.release(agent.id).await;
                continue;
            };
            if status.transition_to(TaskState::Running).is_err() {
                // Cancelled between the pending check and here.
                inner.pool.release(agent.id).await;
                continue;
            }
            let snapshot = status.clone();
            let token = CancellationToken::new();
            state.cancel_tokens.insert(task_id, token.clone());
            state.bindings.insert(task_id, agent.id);
            // Published under the lock so no later transition can be
            // delivered before this one.
            inner.publish(TaskEvent::Updated { status: snapshot }).await;
            token
        };
        inner.pool.assign(agent.id, task_id).await;

        let task_inner = inner.clone();
        tokio::spawn(async move {
            run_batch_task(task_inner, task_id, agent, token).await;
        });
    }
}

/// Execute one batch task's type-specific steps, then release or error the
/// agent and publish the terminal state.
async fn run_batch_task(
    inner: Arc<Inner>,
    task_id: Uuid,
    agent: Agent,
    cancel: CancellationToken,
) {
    let started = Utc::now();
    let (task, step_names) = {
        let state = inner.state.lock().await;
        let Some(status) = state.statuses.get(&task_id) else {
            inner.pool.release(agent.id).await;
            return;
        };
        (
            status.task.clone(),
            steps::decompose(status.task.task_type),
        )
    };
    let total_steps = step_names.len();
    let mut failure = None;

    for (index, name) in step_names.into_iter().enumerate() {
        let step = {
            let mut state = inner.state.lock().await;
            let Some(status) = state.statuses.get_mut(&task_id) else {
                break;
            };
            if status.state != TaskState::Running {
                break;
            }
            let mut step = TaskStep::new(name);
            step.start();
            status.steps.push(step.clone());
            let snapshot = status.clone();
            inner.publish(TaskEvent::Updated { status: snapshot }).await;
            step
        };

        match inner
            .executor
            .execute_step(&task, &step, Some(&agent), &cancel)
            .await
        {
            Ok(output) => {
                let progress = progress_after(index + 1, total_steps);
                let mut state = inner.state.lock().await;
                let Some(status) = state.statuses.get_mut(&task_id) else {
                    break;
                };
                if status.state != TaskState::Running {
                    // Cancelled mid-step; the late result is discarded.
                    break;
                }
                if let Some(slot) = status.steps.iter_mut().find(|s| s.id == step.id) {
                    slot.complete(output);
                }
                status.advance_progress(progress);
                let snapshot = status.clone();
                inner.publish(TaskEvent::Updated { status: snapshot }).await;
            }
            Err(error) => {
                failure = Some(error);
                break;
            }
        }
    }

    // Terminal bookkeeping: the terminal event goes out under the lock,
    // pool disposition follows after.
    let completed = {
        let mut state = inner.state.lock().await;
        state.bindings.remove(&task_id);
        state.cancel_tokens.remove(&task_id);
        let terminal = match state.statuses.get_mut(&task_id) {
            Some(status) if status.state == TaskState::Running => match failure {
                Some(error) => {
                    warn!(%task_id, error = %error, "batch task failed");
                    status.fail(error).ok().map(|()| (status.clone(), false))
                }
                None => {
                    let output = status
                        .steps
                        .iter()
                        .filter_map(|s| s.output.as_deref())
                        .collect::<Vec<_>>()
                        .join("\n");
                    let duration_ms =
                        u64::try_from((Utc::now() - started).num_milliseconds().max(0))
                            .unwrap_or(0);
                    status
                        .complete(TaskResult {
                            success: true,
                            output,
                            metrics: Some(TaskMetrics {
                                files_modified: 0,
                                lines_changed: 0,
                                duration_ms,
                            }),
                        })
                        .ok()
                        .map(|()| (status.clone(), true))
                }
            },
            // Cancelled or unknown: nothing further to record here.
            _ => None,
        };
        match terminal {
            Some((snapshot, completed)) => {
                inner.publish(TaskEvent::Updated { status: snapshot }).await;
                Some(completed)
            }
            None => None,
        }
    };

    match completed {
        Some(true) => {
            inner.pool.release(agent.id).await;
            info!(%task_id, agent = %agent.name, "batch task completed");
        }
        Some(false) => {
            inner.pool.mark_error(agent.id).await;
        }
        // Cancelled: cancel() already released the agent and published.
        None => {}
    }
}

/// Role an agent would ideally bring to a task of this type.
fn preferred_role_for(task_type: TaskType) -> Option<AgentRole> {
    match task_type {
        TaskType::CodeGeneration | TaskType::Refactoring | TaskType::BugFix => {
            Some(AgentRole::Backend)
        }
        TaskType::TestGeneration => Some(AgentRole::Test),
        TaskType::Documentation => Some(AgentRole::Doc),
        TaskType::CodeReview | TaskType::Research => Some(AgentRole::Architect),
        TaskType::Custom => None,
    }
}

fn progress_after(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (done as f64 / total as f64 * 100.0).round();
    u8::try_from(pct as i64).unwrap_or(100).min(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_rounding() {
        assert_eq!(progress_after(1, 3), 33);
        assert_eq!(progress_after(2, 2), 100);
    }
}
