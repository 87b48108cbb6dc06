//! Engine: the composition root.
//!
//! Wires the event bus, agent pool, orchestrator, batch executor, and
//! progress aggregator into one explicitly constructed, dependency-injected
//! unit owned by the embedding application. Nothing here is a process-wide
//! singleton; tests build and tear down engines freely.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::adapters::simulated::SimulatedStepExecutor;
use crate::domain::errors::DomainResult;
use crate::domain::events::EventBus;
use crate::domain::models::agent::Agent;
use crate::domain::models::graph::TaskGraph;
use crate::domain::models::task::{AgentTask, TaskStatus};
use crate::domain::ports::StepExecutor;
use crate::infrastructure::config::Config;
use crate::services::analyzer::DependencyAnalyzer;
use crate::services::batch::BatchExecutor;
use crate::services::orchestrator::{Orchestrator, TaskFilter, UpdateCallback};
use crate::services::planner::{ExecutionPlan, ExecutionPlanner};
use crate::services::pool::{AgentPool, PoolStats};
use crate::services::progress::{ProgressAggregator, ProgressSnapshot};

/// The assembled scheduling engine.
pub struct Engine {
    bus: EventBus,
    pool: Arc<AgentPool>,
    orchestrator: Orchestrator,
    batch: BatchExecutor,
    aggregator: ProgressAggregator,
    analyzer: DependencyAnalyzer,
    planner: ExecutionPlanner,
}

impl Engine {
    /// Build an engine from configuration with the default simulated step
    /// executor.
    pub fn new(config: &Config) -> Self {
        let executor: Arc<dyn StepExecutor> = Arc::new(SimulatedStepExecutor::new(
            Duration::from_millis(config.executor.step_delay_ms),
        ));
        Self::with_executor(config, executor)
    }

    /// Build an engine around a caller-supplied step executor.
    pub fn with_executor(config: &Config, executor: Arc<dyn StepExecutor>) -> Self {
        let bus = EventBus::default();
        let pool = Arc::new(AgentPool::new(config.pool));
        let orchestrator = Orchestrator::new(
            executor.clone(),
            bus.clone(),
            config.max_concurrent_tasks,
        );
        let batch = BatchExecutor::with_backoff(
            pool.clone(),
            executor,
            bus.clone(),
            Duration::from_millis(config.executor.acquire_backoff_ms),
        );
        let aggregator = ProgressAggregator::new(bus.clone());
        Self {
            bus,
            pool,
            orchestrator,
            batch,
            aggregator,
            analyzer: DependencyAnalyzer::new(),
            planner: ExecutionPlanner::new(),
        }
    }

    /// Submit a single task to the priority scheduler.
    pub async fn submit(&self, task: AgentTask) -> DomainResult<Uuid> {
        self.orchestrator.submit(task).await
    }

    /// Submit a dependency-planned batch to the parallel executor.
    pub async fn submit_batch(&self, tasks: Vec<AgentTask>) -> DomainResult<Vec<Uuid>> {
        self.batch.submit_planned(tasks).await
    }

    /// Status of a task submitted through either path.
    pub async fn get_status(&self, task_id: Uuid) -> Option<TaskStatus> {
        match self.orchestrator.get_status(task_id).await {
            Some(status) => Some(status),
            None => self.batch.get_status(task_id).await,
        }
    }

    /// Cancel a task submitted through either path.
    pub async fn cancel(&self, task_id: Uuid) -> bool {
        self.orchestrator.cancel(task_id).await || self.batch.cancel(task_id).await
    }

    /// Orchestrator-tracked statuses matching `filter`.
    pub async fn list(&self, filter: &TaskFilter) -> Vec<TaskStatus> {
        self.orchestrator.list(filter).await
    }

    /// Statuses submitted since `since`, any state.
    pub async fn list_since(&self, since: DateTime<Utc>) -> Vec<TaskStatus> {
        self.orchestrator
            .list(&TaskFilter {
                submitted_since: Some(since),
                ..TaskFilter::default()
            })
            .await
    }

    /// Register a synchronous status observer.
    pub async fn on_update(&self, callback: UpdateCallback) {
        self.orchestrator.on_update(callback).await;
    }

    /// Derive the dependency graph for a batch without submitting it.
    pub fn analyze_dependencies(&self, tasks: &[AgentTask]) -> TaskGraph {
        self.analyzer.analyze(tasks)
    }

    /// Layer a dependency graph without submitting it.
    pub fn generate_plan(&self, graph: &TaskGraph) -> DomainResult<ExecutionPlan> {
        self.planner.plan(graph)
    }

    /// Human-readable plan rendering for logs.
    pub fn render_plan(&self, plan: &ExecutionPlan, graph: &TaskGraph) -> String {
        self.planner.render(plan, graph)
    }

    /// Agent pool counters.
    pub async fn pool_stats(&self) -> PoolStats {
        self.pool.stats().await
    }

    /// Snapshot of every pool agent.
    pub async fn all_agents(&self) -> Vec<Agent> {
        self.pool.all_agents().await
    }

    /// The event bus observers subscribe to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Start deriving progress metrics from the event stream.
    pub async fn start_metrics(&self) {
        self.aggregator.start().await;
    }

    /// Current derived metrics.
    pub async fn metrics(&self) -> ProgressSnapshot {
        self.aggregator.snapshot().await
    }

    /// Tear down background observers. Safe to call repeatedly; intended
    /// for test isolation.
    pub async fn shutdown(&self) {
        self.aggregator.stop().await;
    }
}
