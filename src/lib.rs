//! Conductor - Agent Task Orchestration and Parallel Scheduling Engine
//!
//! Conductor accepts agent tasks, infers which of them may run
//! concurrently, bounds concurrency against a pool of worker agents,
//! executes each task as an ordered sequence of steps, and reports every
//! lifecycle transition to observers.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): pure models, typed events, errors, ports
//! - **Service Layer** (`services`): analyzer, planner, orchestrator,
//!   agent pool, batch executor, progress aggregator
//! - **Adapters** (`adapters`): concrete step executors
//! - **Application Layer** (`application`): the dependency-injected engine
//! - **Infrastructure Layer** (`infrastructure`): config and logging
//!
//! # Example
//!
//! ```no_run
//! use conductor::application::Engine;
//! use conductor::domain::models::task::{AgentTask, TaskType};
//! use conductor::infrastructure::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::new(&Config::default());
//!     let id = engine
//!         .submit(AgentTask::new(TaskType::CodeGeneration, "add a login form"))
//!         .await?;
//!     let status = engine.get_status(id).await;
//!     println!("{status:?}");
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::SimulatedStepExecutor;
pub use application::Engine;
pub use domain::events::{EventBus, TaskEvent};
pub use domain::models::{
    Agent, AgentRole, AgentState, AgentTask, TaskContext, TaskError, TaskGraph, TaskMetrics,
    TaskNode, TaskPriority, TaskResult, TaskState, TaskStatus, TaskStep, TaskType,
};
pub use domain::ports::StepExecutor;
pub use domain::{DomainError, DomainResult};
pub use infrastructure::{Config, ConfigError, ConfigLoader, Logging};
pub use services::{
    AgentPool, BatchExecutor, DependencyAnalyzer, ExecutionPlan, ExecutionPlanner, Orchestrator,
    PlanStats, PoolConfig, PoolStats, ProgressAggregator, ProgressSnapshot, TaskFilter,
};
