//! Task domain model.
//!
//! An [`AgentTask`] is the immutable description of a unit of work; a
//! [`TaskStatus`] is the mutable lifecycle record the scheduler owns for it.
//! Tasks and their steps share one state machine.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Generate new code.
    CodeGeneration,
    /// Restructure existing code without changing behavior.
    Refactoring,
    /// Fix a defect.
    BugFix,
    /// Write tests for existing code.
    TestGeneration,
    /// Write or update documentation.
    Documentation,
    /// Review code without modifying it.
    CodeReview,
    /// Investigate; produces notes, not edits.
    Research,
    /// Anything else.
    Custom,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "code_generation",
            Self::Refactoring => "refactoring",
            Self::BugFix => "bug_fix",
            Self::TestGeneration => "test_generation",
            Self::Documentation => "documentation",
            Self::CodeReview => "code_review",
            Self::Research => "research",
            Self::Custom => "custom",
        }
    }

    /// Whether this task type only reads the files it references.
    ///
    /// Two read-only tasks on the same file may run concurrently; anything
    /// else touching a shared file must serialize.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::CodeReview | Self::Documentation)
    }

    /// Icon used in plan renderings.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "⚡",
            Self::Refactoring => "🔧",
            Self::BugFix => "🐛",
            Self::TestGeneration => "🧪",
            Self::Documentation => "📄",
            Self::CodeReview => "🔍",
            Self::Research => "🔬",
            Self::Custom => "📦",
        }
    }
}

/// Priority level for tasks. Ordering is by urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Urgent = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// Lifecycle state shared by tasks and steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Submitted, not yet dequeued.
    Pending,
    /// A concurrency slot / agent has been acquired and steps are executing.
    Running,
    /// Reserved. Declared in the machine but no operation triggers it.
    Paused,
    /// All steps finished successfully.
    Completed,
    /// A step raised an unrecoverable error.
    Failed,
    /// Cancelled before or during execution.
    Cancelled,
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Valid transitions from this state.
    pub fn valid_transitions(&self) -> Vec<TaskState> {
        match self {
            Self::Pending => vec![Self::Running, Self::Cancelled],
            Self::Running => vec![Self::Completed, Self::Failed, Self::Paused, Self::Cancelled],
            // Paused is reserved; resuming would re-enter Running.
            Self::Paused => vec![Self::Running, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_state: Self) -> bool {
        self.valid_transitions().contains(&new_state)
    }
}

/// Workspace context a task executes against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    /// Workspace root path.
    pub workspace_root: String,
    /// File the task is focused on, if any.
    pub active_file: Option<String>,
    /// Other files the task references.
    pub referenced_files: Vec<String>,
    /// Text the submitter had selected, if any.
    pub selected_text: Option<String>,
}

impl TaskContext {
    pub fn new(workspace_root: impl Into<String>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            ..Self::default()
        }
    }
}

/// Immutable description of a unit of submitted work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    /// Unique identifier, assigned at construction.
    pub id: Uuid,
    /// Kind of work.
    pub task_type: TaskType,
    /// Free-text description of the work.
    pub description: String,
    /// Workspace context.
    pub context: TaskContext,
    /// Scheduling priority.
    pub priority: TaskPriority,
    /// Opaque key/value pairs reserved for future policy hooks.
    pub constraints: HashMap<String, String>,
}

impl AgentTask {
    /// Create a new task with defaults (normal priority, empty context).
    pub fn new(task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type,
            description: description.into(),
            context: TaskContext::default(),
            priority: TaskPriority::default(),
            constraints: HashMap::new(),
        }
    }

    /// Set priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the workspace context.
    pub fn with_context(mut self, context: TaskContext) -> Self {
        self.context = context;
        self
    }

    /// Set the file the task is focused on.
    pub fn with_active_file(mut self, path: impl Into<String>) -> Self {
        self.context.active_file = Some(path.into());
        self
    }

    /// Add an opaque constraint.
    pub fn with_constraint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    /// Validate task fields.
    pub fn validate(&self) -> DomainResult<()> {
        if self.description.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "task description cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One ordered sub-unit of a task's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    /// Unique identifier.
    pub id: Uuid,
    /// Human-readable step name.
    pub name: String,
    /// Step state; shares the task state machine.
    pub state: TaskState,
    /// When the step started running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the step reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Opaque output, set on completion.
    pub output: Option<String>,
}

impl TaskStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: TaskState::Pending,
            started_at: None,
            finished_at: None,
            output: None,
        }
    }

    /// Mark the step running.
    pub fn start(&mut self) {
        self.state = TaskState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark the step completed with its output.
    pub fn complete(&mut self, output: impl Into<String>) {
        self.state = TaskState::Completed;
        self.finished_at = Some(Utc::now());
        self.output = Some(output.into());
    }

    /// Mark the step failed.
    pub fn fail(&mut self) {
        self.state = TaskState::Failed;
        self.finished_at = Some(Utc::now());
    }
}

/// Quantitative outcome of a successful task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetrics {
    /// Files the task modified.
    pub files_modified: u32,
    /// Lines changed across those files.
    pub lines_changed: u32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Outcome of a successfully completed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Always true for a completed task; kept for wire symmetry.
    pub success: bool,
    /// Opaque output, typically the concatenated step outputs.
    pub output: String,
    /// Optional quantitative metrics.
    pub metrics: Option<TaskMetrics>,
}

/// Error code for a step that rejected during execution.
pub const EXECUTION_ERROR: &str = "EXECUTION_ERROR";

/// Why a task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Stable error code, e.g. [`EXECUTION_ERROR`].
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether resubmitting the task could plausibly succeed.
    pub recoverable: bool,
}

impl TaskError {
    /// An unrecoverable execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            code: EXECUTION_ERROR.to_string(),
            message: message.into(),
            recoverable: false,
        }
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Mutable lifecycle record for one submitted task.
///
/// Exactly one exists per submitted task id, owned exclusively by the
/// scheduler that created it. The `steps` sequence only grows; `progress`
/// is non-decreasing while the task is running; a terminal status rejects
/// all further mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Task id (equals `task.id`).
    pub id: Uuid,
    /// The immutable task description.
    pub task: AgentTask,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Completion percentage, 0-100.
    pub progress: u8,
    /// When the record was created (submission time).
    pub submitted_at: DateTime<Utc>,
    /// When execution started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Ordered, append-only step records.
    pub steps: Vec<TaskStep>,
    /// Present only on success.
    pub result: Option<TaskResult>,
    /// Present only on failure.
    pub error: Option<TaskError>,
}

impl TaskStatus {
    /// Create a pending status for a newly submitted task.
    pub fn new(task: AgentTask) -> Self {
        Self {
            id: task.id,
            task,
            state: TaskState::Pending,
            progress: 0,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            steps: Vec::new(),
            result: None,
            error: None,
        }
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Transition to a new state, updating timestamps.
    ///
    /// Rejects illegal transitions, including any transition out of a
    /// terminal state.
    pub fn transition_to(&mut self, new_state: TaskState) -> DomainResult<()> {
        if !self.state.can_transition_to(new_state) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: new_state.as_str().to_string(),
            });
        }
        self.state = new_state;
        match new_state {
            TaskState::Running => self.started_at = Some(Utc::now()),
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled => {
                self.finished_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    /// Raise progress to `value`. Progress never decreases.
    pub fn advance_progress(&mut self, value: u8) {
        self.progress = self.progress.max(value.min(100));
    }

    /// Mark completed with a synthesized result.
    pub fn complete(&mut self, result: TaskResult) -> DomainResult<()> {
        self.transition_to(TaskState::Completed)?;
        self.progress = 100;
        self.result = Some(result);
        Ok(())
    }

    /// Mark failed with the given error.
    pub fn fail(&mut self, error: TaskError) -> DomainResult<()> {
        self.transition_to(TaskState::Failed)?;
        self.error = Some(error);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = AgentTask::new(TaskType::CodeGeneration, "Implement the login feature");
        assert_eq!(task.description, "Implement the login feature");
        assert_eq!(task.priority, TaskPriority::Normal);
        assert!(task.context.active_file.is_none());
    }

    #[test]
    fn test_task_validation() {
        let task = AgentTask::new(TaskType::Custom, "   ");
        assert!(task.validate().is_err());
        let task = AgentTask::new(TaskType::Custom, "do something");
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Urgent > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Low);
    }

    #[test]
    fn test_state_transitions() {
        let task = AgentTask::new(TaskType::BugFix, "fix the panic");
        let mut status = TaskStatus::new(task);
        assert_eq!(status.state, TaskState::Pending);

        status.transition_to(TaskState::Running).unwrap();
        assert!(status.started_at.is_some());

        status.transition_to(TaskState::Completed).unwrap();
        assert!(status.finished_at.is_some());
        assert!(status.is_terminal());

        // Terminal states reject all further transitions.
        assert!(status.transition_to(TaskState::Running).is_err());
        assert!(status.transition_to(TaskState::Cancelled).is_err());
    }

    #[test]
    fn test_no_direct_pending_to_completed() {
        assert!(!TaskState::Pending.can_transition_to(TaskState::Completed));
        assert!(!TaskState::Pending.can_transition_to(TaskState::Failed));
    }

    #[test]
    fn test_paused_is_declared_but_reserved() {
        assert!(TaskState::Running.can_transition_to(TaskState::Paused));
        assert!(!TaskState::Pending.can_transition_to(TaskState::Paused));
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut status = TaskStatus::new(AgentTask::new(TaskType::Custom, "work"));
        status.transition_to(TaskState::Running).unwrap();
        status.advance_progress(40);
        assert_eq!(status.progress, 40);
        status.advance_progress(30);
        assert_eq!(status.progress, 40);
        status.advance_progress(120);
        assert_eq!(status.progress, 100);
    }

    #[test]
    fn test_step_lifecycle() {
        let mut step = TaskStep::new("Analyzing requirements");
        assert_eq!(step.state, TaskState::Pending);
        step.start();
        assert_eq!(step.state, TaskState::Running);
        assert!(step.started_at.is_some());
        step.complete("done");
        assert_eq!(step.state, TaskState::Completed);
        assert_eq!(step.output.as_deref(), Some("done"));
    }

    #[test]
    fn test_read_only_types() {
        assert!(TaskType::CodeReview.is_read_only());
        assert!(TaskType::Documentation.is_read_only());
        assert!(!TaskType::CodeGeneration.is_read_only());
        assert!(!TaskType::Refactoring.is_read_only());
    }
}
