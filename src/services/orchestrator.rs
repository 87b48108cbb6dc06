//! Orchestrator: the central scheduler.
//!
//! Owns one status record per submitted task, a priority-ordered pending
//! queue, a running set bounded by `max_concurrent_tasks`, and the state
//! machine for every task. Every transition is published to synchronous
//! subscribers and to the event bus; subscribers see one task's events in
//! the order they occurred.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::events::{EventBus, TaskEvent};
use crate::domain::models::task::{
    AgentTask, TaskError, TaskMetrics, TaskPriority, TaskResult, TaskState, TaskStatus, TaskStep,
    TaskType,
};
use crate::domain::ports::StepExecutor;
use crate::services::steps;

/// Default bound on concurrently running tasks.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 3;

/// Callback invoked synchronously on every status transition.
pub type UpdateCallback = Box<dyn Fn(&TaskStatus) + Send + Sync>;

/// Filter for [`Orchestrator::list`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Keep only tasks in this state.
    pub state: Option<TaskState>,
    /// Keep only tasks of this type.
    pub task_type: Option<TaskType>,
    /// Keep only tasks at this priority.
    pub priority: Option<TaskPriority>,
    /// Keep only tasks submitted at or after this instant.
    pub submitted_since: Option<DateTime<Utc>>,
}

impl TaskFilter {
    fn matches(&self, status: &TaskStatus) -> bool {
        if let Some(state) = self.state {
            if status.state != state {
                return false;
            }
        }
        if let Some(task_type) = self.task_type {
            if status.task.task_type != task_type {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if status.task.priority != priority {
                return false;
            }
        }
        if let Some(since) = self.submitted_since {
            if status.submitted_at < since {
                return false;
            }
        }
        true
    }
}

struct SchedulerState {
    statuses: HashMap<Uuid, TaskStatus>,
    /// Pending task ids, highest priority first; ties keep submission order.
    pending: VecDeque<Uuid>,
    running: HashSet<Uuid>,
    cancel_tokens: HashMap<Uuid, CancellationToken>,
}

struct Inner {
    state: Mutex<SchedulerState>,
    subscribers: Mutex<Vec<UpdateCallback>>,
    executor: Arc<dyn StepExecutor>,
    bus: EventBus,
    max_concurrent_tasks: usize,
}

impl Inner {
    /// Publish an update: synchronous callbacks first, then the bus.
    /// Callers invoke this while still holding the scheduler lock; that is
    /// what keeps one task's events in transition order.
    async fn publish(&self, event: TaskEvent) {
        let subscribers = self.subscribers.lock().await;
        for callback in subscribers.iter() {
            callback(event.status());
        }
        drop(subscribers);
        self.bus.emit(event);
    }
}

/// The central scheduler.
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Create an orchestrator with the given step executor, event bus, and
    /// concurrency bound.
    pub fn new(executor: Arc<dyn StepExecutor>, bus: EventBus, max_concurrent_tasks: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SchedulerState {
                    statuses: HashMap::new(),
                    pending: VecDeque::new(),
                    running: HashSet::new(),
                    cancel_tokens: HashMap::new(),
                }),
                subscribers: Mutex::new(Vec::new()),
                executor,
                bus,
                max_concurrent_tasks: max_concurrent_tasks.max(1),
            }),
        }
    }

    /// Submit a task: create its pending status, enqueue by priority, and
    /// drain the queue.
    #[instrument(skip(self, task), fields(task_id = %task.id, task_type = task.task_type.as_str()))]
    pub async fn submit(&self, task: AgentTask) -> DomainResult<Uuid> {
        task.validate()?;
        let task_id = task.id;
        let status = TaskStatus::new(task);

        {
            let mut state = self.inner.state.lock().await;
            state.statuses.insert(task_id, status.clone());
            state.pending.push_back(task_id);
            sort_pending(&mut state);
            // Published under the lock so no later transition can be
            // delivered before this one.
            self.inner.publish(TaskEvent::Submitted { status }).await;
        }
        info!(%task_id, "task submitted");

        self.drain().await;
        Ok(task_id)
    }

    /// Cancel a task. Returns false if the id is unknown or the task is
    /// already terminal. Cancellation is cooperative: an in-flight step is
    /// abandoned, not awaited, and its late result is discarded.
    #[instrument(skip(self))]
    pub async fn cancel(&self, task_id: Uuid) -> bool {
        {
            let mut state = self.inner.state.lock().await;
            let Some(status) = state.statuses.get_mut(&task_id) else {
                return false;
            };
            if status.is_terminal() {
                debug!(%task_id, state = status.state.as_str(), "cancel on terminal task");
                return false;
            }
            if status.transition_to(TaskState::Cancelled).is_err() {
                return false;
            }
            let snapshot = status.clone();
            state.pending.retain(|id| *id != task_id);
            state.running.remove(&task_id);
            if let Some(token) = state.cancel_tokens.remove(&task_id) {
                token.cancel();
            }
            self.inner.publish(TaskEvent::Updated { status: snapshot }).await;
        }
        info!(%task_id, "task cancelled");
        self.drain().await;
        true
    }

    /// Status snapshot for one task.
    pub async fn get_status(&self, task_id: Uuid) -> Option<TaskStatus> {
        let state = self.inner.state.lock().await;
        state.statuses.get(&task_id).cloned()
    }

    /// All tracked statuses matching `filter`, sorted by descending start
    /// time (never-started tasks last).
    pub async fn list(&self, filter: &TaskFilter) -> Vec<TaskStatus> {
        let state = self.inner.state.lock().await;
        let mut out: Vec<TaskStatus> = state
            .statuses
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        out
    }

    /// Register a callback invoked synchronously on every transition.
    pub async fn on_update(&self, callback: UpdateCallback) {
        self.inner.subscribers.lock().await.push(callback);
    }

    /// Pending queue order, highest priority first. Introspection only.
    pub async fn queue_snapshot(&self) -> Vec<Uuid> {
        let state = self.inner.state.lock().await;
        state.pending.iter().copied().collect()
    }

    /// Number of currently running tasks.
    pub async fn running_count(&self) -> usize {
        let state = self.inner.state.lock().await;
        state.running.len()
    }

    /// Pull tasks from the queue while concurrency slots are free.
    async fn drain(&self) {
        drain(&self.inner).await;
    }
}

/// Pull tasks from the queue while concurrency slots are free. Re-invoked
/// whenever a task finishes so the running slots stay saturated.
///
/// Returns a boxed future: `run_task` awaits the drain loop while the loop
/// spawns `run_task`, so one side is type-erased to keep the future types
/// finite.
fn drain(inner: &Arc<Inner>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let inner = inner.clone();
    Box::pin(async move {
        loop {
            let (task_id, token) = {
                let mut state = inner.state.lock().await;
                if state.running.len() >= inner.max_concurrent_tasks {
                    break;
                }
                let Some(task_id) = state.pending.pop_front() else {
                    break;
                };
                let Some(status) = state.statuses.get_mut(&task_id) else {
                    continue;
                };
                if status.transition_to(TaskState::Running).is_err() {
                    // Lost a race with cancel; skip.
                    continue;
                }
                let snapshot = status.clone();
                state.running.insert(task_id);
                let token = CancellationToken::new();
                state.cancel_tokens.insert(task_id, token.clone());
                debug!(%task_id, "task dequeued");
                inner.publish(TaskEvent::Updated { status: snapshot }).await;
                (task_id, token)
            };

            let task_inner = inner.clone();
            tokio::spawn(async move {
                run_task(task_inner, task_id, token).await;
            });
        }
    })
}

/// Stable sort of the pending queue by descending priority. Ties preserve
/// submission order.
fn sort_pending(state: &mut SchedulerState) {
    let statuses = &state.statuses;
    let mut ids: Vec<Uuid> = state.pending.iter().copied().collect();
    ids.sort_by(|a, b| {
        let pa = statuses.get(a).map_or(TaskPriority::Normal, |s| s.task.priority);
        let pb = statuses.get(b).map_or(TaskPriority::Normal, |s| s.task.priority);
        pb.cmp(&pa)
    });
    state.pending = ids.into();
}

/// Run one task's fixed step pipeline to a terminal state, then free the
/// concurrency slot and re-drain.
async fn run_task(inner: Arc<Inner>, task_id: Uuid, cancel: CancellationToken) {
    let started = Utc::now();
    let step_names = steps::orchestrator_pipeline();
    let total_steps = step_names.len();
    let mut failure: Option<TaskError> = None;

    for (index, name) in step_names.into_iter().enumerate() {
        // Begin the step, unless the task stopped running underneath us.
        let Some((task, step)) = begin_step(&inner, task_id, name).await else {
            break;
        };

        let outcome = inner
            .executor
            .execute_step(&task, &step, None, &cancel)
            .await;

        match outcome {
            Ok(output) => {
                let progress = progress_after(index + 1, total_steps);
                if !finish_step(&inner, task_id, step.id, &output, progress).await {
                    // Task went terminal mid-step; discard the late result.
                    break;
                }
            }
            Err(error) => {
                failure = Some(error);
                break;
            }
        }
    }

    finish_task(&inner, task_id, started, failure).await;

    {
        let mut state = inner.state.lock().await;
        state.running.remove(&task_id);
        state.cancel_tokens.remove(&task_id);
    }

    // Keep the running slots saturated.
    drain(&inner).await;
}

/// Append a pending step, transition it to running, and publish both
/// transitions. Returns `None` if the task is no longer running.
async fn begin_step(inner: &Arc<Inner>, task_id: Uuid, name: &str) -> Option<(AgentTask, TaskStep)> {
    let mut state = inner.state.lock().await;
    let status = state.statuses.get_mut(&task_id)?;
    if status.state != TaskState::Running {
        return None;
    }
    let mut step = TaskStep::new(name);
    status.steps.push(step.clone());
    let pending_snapshot = status.clone();

    step.start();
    if let Some(slot) = status.steps.last_mut() {
        *slot = step.clone();
    }
    let running_snapshot = status.clone();
    let task = status.task.clone();
    inner
        .publish(TaskEvent::Updated {
            status: pending_snapshot,
        })
        .await;
    inner
        .publish(TaskEvent::Updated {
            status: running_snapshot,
        })
        .await;
    Some((task, step))
}

/// Complete a step and advance progress. Returns false when the task is no
/// longer running (cancelled mid-flight).
async fn finish_step(
    inner: &Arc<Inner>,
    task_id: Uuid,
    step_id: Uuid,
    output: &str,
    progress: u8,
) -> bool {
    let mut state = inner.state.lock().await;
    let Some(status) = state.statuses.get_mut(&task_id) else {
        return false;
    };
    if status.state != TaskState::Running {
        return false;
    }
    if let Some(step) = status.steps.iter_mut().find(|s| s.id == step_id) {
        step.complete(output);
    }
    status.advance_progress(progress);
    let snapshot = status.clone();
    inner.publish(TaskEvent::Updated { status: snapshot }).await;
    true
}

/// Drive the task to its terminal state and publish it. A task that went
/// terminal some other way (cancelled) is left untouched.
async fn finish_task(
    inner: &Arc<Inner>,
    task_id: Uuid,
    started: DateTime<Utc>,
    failure: Option<TaskError>,
) {
    let mut state = inner.state.lock().await;
    let Some(status) = state.statuses.get_mut(&task_id) else {
        return;
    };
    if status.state != TaskState::Running {
        return;
    }
    let outcome = match failure {
        Some(error) => {
            warn!(%task_id, error = %error, "task failed");
            status.fail(error)
        }
        None => {
            let output = synthesize_output(status);
            let duration_ms =
                u64::try_from((Utc::now() - started).num_milliseconds().max(0)).unwrap_or(0);
            info!(%task_id, duration_ms, "task completed");
            status.complete(TaskResult {
                success: true,
                output,
                metrics: Some(TaskMetrics {
                    files_modified: 0,
                    lines_changed: 0,
                    duration_ms,
                }),
            })
        }
    };
    if outcome.is_err() {
        return;
    }
    let snapshot = status.clone();
    inner.publish(TaskEvent::Updated { status: snapshot }).await;
}

fn synthesize_output(status: &TaskStatus) -> String {
    status
        .steps
        .iter()
        .filter_map(|s| s.output.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Progress after `done` of `total` steps, rounded.
fn progress_after(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (done as f64 / total as f64 * 100.0).round();
    u8::try_from(pct as i64).unwrap_or(100).min(100)
}
