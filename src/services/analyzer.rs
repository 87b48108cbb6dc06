//! Dependency analyzer.
//!
//! Derives a dependency graph over a batch of tasks from a fixed set of
//! domain ordering rules. Edges are only ever drawn from a task to a task
//! that appears *earlier* in the input sequence, which makes the resulting
//! graph acyclic by construction; no separate cycle check is needed.

use tracing::{debug, instrument};

use crate::domain::models::graph::{TaskGraph, TaskNode};
use crate::domain::models::task::{AgentTask, TaskType};

/// Service deriving safe-parallelism constraints for a batch of tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyAnalyzer;

impl DependencyAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Build the dependency graph for `tasks`, in submission order.
    ///
    /// For each task, every earlier task is checked against the ordering
    /// rules; each rule that fires adds one edge (duplicate hits collapse
    /// into the dependency set).
    #[instrument(skip_all, fields(task_count = tasks.len()))]
    pub fn analyze(&self, tasks: &[AgentTask]) -> TaskGraph {
        let mut graph = TaskGraph::new();
        for task in tasks {
            graph.insert(TaskNode::new(task.clone()));
        }

        for (i, task) in tasks.iter().enumerate() {
            for earlier in &tasks[..i] {
                if depends_on(task, earlier) {
                    debug!(
                        from = %task.id,
                        to = %earlier.id,
                        from_type = task.task_type.as_str(),
                        to_type = earlier.task_type.as_str(),
                        "dependency edge"
                    );
                    graph.add_dependency(task.id, earlier.id);
                }
            }
        }
        graph
    }
}

/// Domain ordering rules. `earlier` precedes `task` in submission order.
fn depends_on(task: &AgentTask, earlier: &AgentTask) -> bool {
    // Tests follow the code they test.
    if task.task_type == TaskType::TestGeneration && earlier.task_type == TaskType::CodeGeneration {
        return true;
    }
    // Reviews follow refactorings.
    if task.task_type == TaskType::CodeReview && earlier.task_type == TaskType::Refactoring {
        return true;
    }
    // Documentation follows generated code.
    if task.task_type == TaskType::Documentation && earlier.task_type == TaskType::CodeGeneration {
        return true;
    }
    // Mutating operations on a shared file must serialize; two read-only
    // operations on the same file may run concurrently.
    if shares_active_file(task, earlier)
        && !(task.task_type.is_read_only() && earlier.task_type.is_read_only())
    {
        return true;
    }
    // Bug fixes preempt all other intent in the batch.
    if task.task_type != TaskType::BugFix && earlier.task_type == TaskType::BugFix {
        return true;
    }
    false
}

fn shares_active_file(a: &AgentTask, b: &AgentTask) -> bool {
    match (&a.context.active_file, &b.context.active_file) {
        (Some(fa), Some(fb)) => fa == fb,
        _ => false,
    }
}
