//! Service layer: the scheduling, planning, and pool logic.

pub mod analyzer;
pub mod batch;
pub mod orchestrator;
pub mod planner;
pub mod pool;
pub mod progress;
pub mod steps;

pub use analyzer::DependencyAnalyzer;
pub use batch::BatchExecutor;
pub use orchestrator::{Orchestrator, TaskFilter};
pub use planner::{ExecutionPlan, ExecutionPlanner, PlanStats};
pub use pool::{AgentPool, PoolConfig, PoolStats};
pub use progress::{ProgressAggregator, ProgressSnapshot};
