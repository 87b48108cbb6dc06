//! Batch executor scenarios: FIFO draining against the agent pool, agent
//! exclusivity, exhaustion backoff, and agent disposition on cancel and
//! failure.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use conductor::domain::events::{EventBus, TaskEvent};
use conductor::domain::models::agent::Agent;
use conductor::domain::models::task::{AgentTask, TaskError, TaskState, TaskStep, TaskType};
use conductor::domain::ports::StepExecutor;
use conductor::services::pool::PoolConfig;
use conductor::{AgentPool, BatchExecutor, SimulatedStepExecutor};

fn batch(pool_config: PoolConfig, executor: Arc<dyn StepExecutor>) -> (BatchExecutor, Arc<AgentPool>) {
    let pool = Arc::new(AgentPool::new(pool_config));
    let exec = BatchExecutor::with_backoff(
        pool.clone(),
        executor,
        EventBus::default(),
        Duration::from_millis(10),
    );
    (exec, pool)
}

async fn wait_terminal(exec: &BatchExecutor, ids: &[Uuid]) {
    for _ in 0..600 {
        let mut done = true;
        for id in ids {
            done &= exec.get_status(*id).await.is_some_and(|s| s.is_terminal());
        }
        if done {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("batch did not reach a terminal state in time");
}

/// Records which agents are mid-step, flagging any agent handed to two
/// tasks at once and remembering the peak parallelism.
struct TrackingExecutor {
    delay: Duration,
    active: Arc<StdMutex<HashSet<Uuid>>>,
    peak: Arc<StdMutex<usize>>,
    overlap: Arc<AtomicBool>,
}

impl TrackingExecutor {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: Arc::new(StdMutex::new(HashSet::new())),
            peak: Arc::new(StdMutex::new(0)),
            overlap: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl StepExecutor for TrackingExecutor {
    async fn execute_step(
        &self,
        _task: &AgentTask,
        step: &TaskStep,
        agent: Option<&Agent>,
        _cancel: &CancellationToken,
    ) -> Result<String, TaskError> {
        let agent = agent.expect("batch execution always binds an agent");
        {
            let mut active = self.active.lock().unwrap();
            if !active.insert(agent.id) {
                self.overlap.store(true, Ordering::SeqCst);
            }
            let mut peak = self.peak.lock().unwrap();
            *peak = (*peak).max(active.len());
        }
        tokio::time::sleep(self.delay).await;
        self.active.lock().unwrap().remove(&agent.id);
        Ok(format!("{} ok", step.name))
    }
}

#[tokio::test]
async fn batch_runs_all_tasks_and_returns_agents() {
    let (exec, pool) = batch(
        PoolConfig::default(),
        Arc::new(SimulatedStepExecutor::new(Duration::from_millis(5))),
    );

    let tasks: Vec<AgentTask> = (0..4)
        .map(|i| AgentTask::new(TaskType::CodeGeneration, format!("module {i}")))
        .collect();
    let ids = exec.submit_batch(tasks).await.unwrap();
    wait_terminal(&exec, &ids).await;

    for id in &ids {
        let status = exec.get_status(*id).await.unwrap();
        assert_eq!(status.state, TaskState::Completed);
        assert_eq!(status.progress, 100);
        assert!(status.result.is_some());
        assert!(!status.steps.is_empty());
    }

    let stats = pool.stats().await;
    assert_eq!(stats.busy, 0);
    assert_eq!(stats.error, 0);
    assert_eq!(stats.total_tasks_completed, 4);
}

#[tokio::test]
async fn steps_are_decomposed_per_task_type() {
    let (exec, _pool) = batch(
        PoolConfig::default(),
        Arc::new(SimulatedStepExecutor::new(Duration::from_millis(2))),
    );

    let task = AgentTask::new(TaskType::Custom, "one-off chore");
    let ids = exec.submit_batch(vec![task]).await.unwrap();
    wait_terminal(&exec, &ids).await;

    let status = exec.get_status(ids[0]).await.unwrap();
    let names: Vec<&str> = status.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Analyzing", "Executing", "Verifying"]);
}

#[tokio::test]
async fn no_agent_serves_two_tasks_at_once() {
    let tracking = TrackingExecutor::new(Duration::from_millis(15));
    let overlap = tracking.overlap.clone();
    let (exec, _pool) = batch(PoolConfig::default(), Arc::new(tracking));

    let tasks: Vec<AgentTask> = (0..10)
        .map(|i| AgentTask::new(TaskType::Custom, format!("task {i}")))
        .collect();
    let ids = exec.submit_batch(tasks).await.unwrap();
    wait_terminal(&exec, &ids).await;

    assert!(!overlap.load(Ordering::SeqCst));
}

#[tokio::test]
async fn exhausted_pool_bounds_parallelism_and_recovers() {
    let tracking = TrackingExecutor::new(Duration::from_millis(15));
    let peak = tracking.peak.clone();
    let (exec, pool) = batch(
        PoolConfig {
            max_agents: 2,
            min_agents: 2,
        },
        Arc::new(tracking),
    );

    let tasks: Vec<AgentTask> = (0..6)
        .map(|i| AgentTask::new(TaskType::Custom, format!("task {i}")))
        .collect();
    let ids = exec.submit_batch(tasks).await.unwrap();
    wait_terminal(&exec, &ids).await;

    // Every task completed despite the queue outnumbering the agents.
    for id in &ids {
        assert_eq!(exec.get_status(*id).await.unwrap().state, TaskState::Completed);
    }
    assert!(*peak.lock().unwrap() <= 2);
    assert_eq!(pool.stats().await.total_tasks_completed, 6);
}

#[tokio::test]
async fn cancel_running_task_releases_its_agent() {
    let (exec, pool) = batch(
        PoolConfig {
            max_agents: 1,
            min_agents: 1,
        },
        Arc::new(SimulatedStepExecutor::new(Duration::from_millis(300))),
    );

    let long = AgentTask::new(TaskType::Custom, "long running");
    let next = AgentTask::new(TaskType::Custom, "waiting for the agent");
    let long_id = long.id;
    let next_id = next.id;
    exec.submit_batch(vec![long, next]).await.unwrap();

    // Let the first task bind the only agent.
    for _ in 0..200 {
        if exec
            .get_status(long_id)
            .await
            .is_some_and(|s| s.state == TaskState::Running)
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(exec.cancel(long_id).await);
    assert_eq!(
        exec.get_status(long_id).await.unwrap().state,
        TaskState::Cancelled
    );

    // The released agent lets the queued task finish.
    wait_terminal(&exec, &[next_id]).await;
    assert_eq!(
        exec.get_status(next_id).await.unwrap().state,
        TaskState::Completed
    );

    // The agent came back idle, not errored.
    tokio::time::sleep(Duration::from_millis(350)).await;
    let stats = pool.stats().await;
    assert_eq!(stats.error, 0);
    assert_eq!(stats.busy, 0);

    // Cancelling again reports failure.
    assert!(!exec.cancel(long_id).await);
}

#[tokio::test]
async fn step_failure_marks_the_agent_errored() {
    let (exec, pool) = batch(
        PoolConfig {
            max_agents: 2,
            min_agents: 2,
        },
        Arc::new(SimulatedStepExecutor::new(Duration::from_millis(5)).failing_on("Executing")),
    );

    let task = AgentTask::new(TaskType::Custom, "doomed");
    let ids = exec.submit_batch(vec![task]).await.unwrap();
    wait_terminal(&exec, &ids).await;

    let status = exec.get_status(ids[0]).await.unwrap();
    assert_eq!(status.state, TaskState::Failed);
    assert_eq!(status.error.unwrap().code, "EXECUTION_ERROR");
    assert!(status.result.is_none());

    let stats = pool.stats().await;
    assert_eq!(stats.error, 1);
    assert_eq!(stats.busy, 0);
}

#[tokio::test]
async fn planned_submission_serializes_dependent_layers() {
    let (exec, _pool) = batch(
        PoolConfig {
            max_agents: 1,
            min_agents: 1,
        },
        Arc::new(SimulatedStepExecutor::new(Duration::from_millis(5))),
    );

    let generate = AgentTask::new(TaskType::CodeGeneration, "build the parser");
    let test = AgentTask::new(TaskType::TestGeneration, "test the parser");
    let generate_id = generate.id;
    let test_id = test.id;

    // Test generation follows the earlier code generation, so the plan
    // keeps the generator ahead of its test.
    let ids = exec.submit_planned(vec![generate, test]).await.unwrap();
    assert_eq!(ids, vec![generate_id, test_id]);
    wait_terminal(&exec, &ids).await;

    let generated = exec.get_status(generate_id).await.unwrap();
    let tested = exec.get_status(test_id).await.unwrap();
    assert_eq!(generated.state, TaskState::Completed);
    assert_eq!(tested.state, TaskState::Completed);
    assert!(tested.started_at.unwrap() >= generated.finished_at.unwrap());
}

#[tokio::test]
async fn reversed_submission_has_no_edge_and_keeps_order() {
    let (exec, _pool) = batch(
        PoolConfig {
            max_agents: 1,
            min_agents: 1,
        },
        Arc::new(SimulatedStepExecutor::new(Duration::from_millis(5))),
    );

    let test = AgentTask::new(TaskType::TestGeneration, "test the parser");
    let generate = AgentTask::new(TaskType::CodeGeneration, "build the parser");
    let test_id = test.id;
    let generate_id = generate.id;

    // Ordering rules only point at earlier tasks, so a test submitted
    // ahead of the code generation owes it nothing: both are roots and
    // the plan keeps submission order.
    let ids = exec.submit_planned(vec![test, generate]).await.unwrap();
    assert_eq!(ids, vec![test_id, generate_id]);
    wait_terminal(&exec, &ids).await;

    assert_eq!(exec.get_status(test_id).await.unwrap().state, TaskState::Completed);
    assert_eq!(
        exec.get_status(generate_id).await.unwrap().state,
        TaskState::Completed
    );
}

#[tokio::test]
async fn no_batch_event_follows_a_terminal_event() {
    let pool = Arc::new(AgentPool::new(PoolConfig::default()));
    let bus = EventBus::default();
    let mut rx = bus.subscribe();
    let exec = BatchExecutor::with_backoff(
        pool,
        Arc::new(SimulatedStepExecutor::new(Duration::from_millis(10))),
        bus,
        Duration::from_millis(10),
    );

    let tasks: Vec<AgentTask> = (0..6)
        .map(|i| AgentTask::new(TaskType::Custom, format!("task {i}")))
        .collect();
    let ids = exec.submit_batch(tasks).await.unwrap();
    for id in ids.iter().step_by(2) {
        exec.cancel(*id).await;
    }
    wait_terminal(&exec, &ids).await;
    // Give abandoned steps time to land their late results.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut terminal: HashSet<Uuid> = HashSet::new();
    while let Ok(event) = rx.try_recv() {
        let (TaskEvent::Submitted { status } | TaskEvent::Updated { status }) = event;
        assert!(
            !terminal.contains(&status.id),
            "event delivered after a terminal state for task {}",
            status.id
        );
        if status.is_terminal() {
            terminal.insert(status.id);
        }
    }
    assert_eq!(terminal.len(), ids.len());
}

#[tokio::test]
async fn empty_and_invalid_batches() {
    let (exec, _pool) = batch(
        PoolConfig::default(),
        Arc::new(SimulatedStepExecutor::new(Duration::from_millis(2))),
    );

    assert!(exec.submit_batch(Vec::new()).await.unwrap().is_empty());

    let invalid = AgentTask::new(TaskType::Custom, "   ");
    assert!(exec.submit_batch(vec![invalid]).await.is_err());
}
