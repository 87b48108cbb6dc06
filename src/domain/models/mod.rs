//! Domain models.

pub mod agent;
pub mod graph;
pub mod task;

pub use agent::{Agent, AgentRole, AgentState};
pub use graph::{TaskGraph, TaskNode};
pub use task::{
    AgentTask, TaskContext, TaskError, TaskMetrics, TaskPriority, TaskResult, TaskState, TaskStatus,
    TaskStep, TaskType,
};
