//! Progress/metrics aggregator.
//!
//! A pure observer over the event bus. It owns no scheduling decisions and
//! never mutates task or agent state; it only derives human-facing numbers
//! from the status snapshots events carry.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::domain::events::{EventBus, TaskEvent};
use crate::domain::models::task::{TaskState, TaskStatus};

/// Bound on the rolling list of recent actions.
const RECENT_ACTIONS: usize = 20;

/// Serial execution is assumed to take this multiple of the parallel time
/// when estimating speed-up. Advisory only.
const SERIAL_MULTIPLE: f64 = 2.5;

/// Derived, human-facing numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Tasks ever observed.
    pub total: usize,
    /// Tasks in a running state.
    pub running: usize,
    /// Tasks completed successfully.
    pub completed: usize,
    /// Tasks failed.
    pub failed: usize,
    /// Tasks cancelled.
    pub cancelled: usize,
    /// The most prominent running task: id, description, progress.
    pub primary: Option<(Uuid, String, u8)>,
    /// Rolling list of the most recent notable actions, newest last.
    pub recent_actions: VecDeque<String>,
    /// Files processed across completed tasks.
    pub files_processed: u32,
    /// Lines changed across completed tasks.
    pub lines_changed: u32,
    /// When observation started.
    pub started_at: Option<DateTime<Utc>>,
    /// Estimated speed-up over serial execution.
    pub speedup_estimate: f64,
}

impl ProgressSnapshot {
    /// Percent of observed tasks that reached a terminal state.
    pub fn percent_complete(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let done = self.completed + self.failed + self.cancelled;
        let pct = (done as f64 / self.total as f64 * 100.0).round();
        u8::try_from(pct as i64).unwrap_or(100).min(100)
    }
}

struct AggregatorState {
    statuses: HashMap<Uuid, TaskStatus>,
    snapshot: ProgressSnapshot,
}

/// Event-driven metrics aggregator. Can be started and stopped repeatedly
/// without leaking its listener task.
pub struct ProgressAggregator {
    bus: EventBus,
    state: Arc<RwLock<AggregatorState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressAggregator {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            state: Arc::new(RwLock::new(AggregatorState {
                statuses: HashMap::new(),
                snapshot: ProgressSnapshot::default(),
            })),
            listener: Mutex::new(None),
        }
    }

    /// Begin observing. Restarting replaces the previous listener.
    pub async fn start(&self) {
        let mut listener = self.listener.lock().await;
        if let Some(handle) = listener.take() {
            handle.abort();
        }
        let mut rx = self.bus.subscribe();
        let state = self.state.clone();
        {
            let mut guard = state.write().await;
            guard.snapshot.started_at = Some(Utc::now());
        }
        *listener = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let mut guard = state.write().await;
                        apply(&mut guard, &event);
                    }
                    // Lagged: skip missed events, keep observing.
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(missed, "aggregator lagged behind the bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Stop observing. Idempotent; aborts the listener task.
    pub async fn stop(&self) {
        let mut listener = self.listener.lock().await;
        if let Some(handle) = listener.take() {
            handle.abort();
        }
    }

    /// Current derived numbers.
    pub async fn snapshot(&self) -> ProgressSnapshot {
        self.state.read().await.snapshot.clone()
    }
}

/// Fold one event into the aggregate.
fn apply(state: &mut AggregatorState, event: &TaskEvent) {
    let status = event.status().clone();
    let task_id = status.id;

    if let TaskEvent::Submitted { .. } = event {
        state
            .snapshot
            .recent_actions
            .push_back(format!("Submitted: {}", status.task.description));
    } else if status.is_terminal() {
        let verb = match status.state {
            TaskState::Completed => "Completed",
            TaskState::Failed => "Failed",
            _ => "Cancelled",
        };
        state
            .snapshot
            .recent_actions
            .push_back(format!("{}: {}", verb, status.task.description));
    }
    while state.snapshot.recent_actions.len() > RECENT_ACTIONS {
        state.snapshot.recent_actions.pop_front();
    }

    state.statuses.insert(task_id, status);
    recompute(state);
}

/// Recompute every derived number from the last-seen statuses.
fn recompute(state: &mut AggregatorState) {
    let snapshot = &mut state.snapshot;
    snapshot.total = state.statuses.len();
    snapshot.running = 0;
    snapshot.completed = 0;
    snapshot.failed = 0;
    snapshot.cancelled = 0;
    snapshot.primary = None;
    snapshot.files_processed = 0;
    snapshot.lines_changed = 0;

    for status in state.statuses.values() {
        match status.state {
            TaskState::Running => {
                snapshot.running += 1;
                if snapshot.primary.is_none() {
                    snapshot.primary = Some((
                        status.id,
                        status.task.description.clone(),
                        status.progress,
                    ));
                }
            }
            TaskState::Completed => snapshot.completed += 1,
            TaskState::Failed => snapshot.failed += 1,
            TaskState::Cancelled => snapshot.cancelled += 1,
            TaskState::Pending | TaskState::Paused => {}
        }
        if let Some(metrics) = status.result.as_ref().and_then(|r| r.metrics.as_ref()) {
            snapshot.files_processed += metrics.files_modified;
            snapshot.lines_changed += metrics.lines_changed;
        }
    }

    snapshot.speedup_estimate = if snapshot.completed > 0 {
        SERIAL_MULTIPLE
    } else {
        1.0
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::{AgentTask, TaskType};

    fn running_status(description: &str, progress: u8) -> TaskStatus {
        let mut status = TaskStatus::new(AgentTask::new(TaskType::Custom, description));
        status.transition_to(TaskState::Running).unwrap();
        status.advance_progress(progress);
        status
    }

    #[test]
    fn test_apply_counts_states() {
        let mut state = AggregatorState {
            statuses: HashMap::new(),
            snapshot: ProgressSnapshot::default(),
        };

        let a = running_status("first", 50);
        let mut b = TaskStatus::new(AgentTask::new(TaskType::Custom, "second"));
        b.transition_to(TaskState::Running).unwrap();
        b.complete(crate::domain::models::task::TaskResult {
            success: true,
            output: String::new(),
            metrics: Some(crate::domain::models::task::TaskMetrics {
                files_modified: 3,
                lines_changed: 42,
                duration_ms: 10,
            }),
        })
        .unwrap();

        apply(&mut state, &TaskEvent::Updated { status: a.clone() });
        apply(&mut state, &TaskEvent::Updated { status: b });

        assert_eq!(state.snapshot.total, 2);
        assert_eq!(state.snapshot.running, 1);
        assert_eq!(state.snapshot.completed, 1);
        assert_eq!(state.snapshot.files_processed, 3);
        assert_eq!(state.snapshot.lines_changed, 42);
        assert_eq!(state.snapshot.primary.as_ref().unwrap().0, a.id);
        assert_eq!(state.snapshot.percent_complete(), 50);
    }

    #[test]
    fn test_recent_actions_ring_is_bounded() {
        let mut state = AggregatorState {
            statuses: HashMap::new(),
            snapshot: ProgressSnapshot::default(),
        };
        for i in 0..50 {
            let status = TaskStatus::new(AgentTask::new(TaskType::Custom, format!("task {i}")));
            apply(&mut state, &TaskEvent::Submitted { status });
        }
        assert_eq!(state.snapshot.recent_actions.len(), RECENT_ACTIONS);
        assert!(state
            .snapshot
            .recent_actions
            .back()
            .unwrap()
            .contains("task 49"));
    }

    #[tokio::test]
    async fn test_start_stop_restart() {
        let bus = EventBus::default();
        let aggregator = ProgressAggregator::new(bus.clone());
        aggregator.start().await;
        aggregator.stop().await;
        aggregator.stop().await;
        aggregator.start().await;

        bus.emit(TaskEvent::Submitted {
            status: TaskStatus::new(AgentTask::new(TaskType::Custom, "observed")),
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(aggregator.snapshot().await.total, 1);
        aggregator.stop().await;
    }
}
