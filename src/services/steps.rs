//! Step decomposition.
//!
//! Canned step sequences: the orchestrator runs one fixed pipeline for
//! every task, while the batch executor decomposes by task type with a
//! generic three-step fallback for unrecognized work.

use crate::domain::models::task::TaskType;

/// Fixed pipeline the orchestrator runs for every task.
pub fn orchestrator_pipeline() -> Vec<&'static str> {
    vec![
        "Analyzing task",
        "Preparing context",
        "Executing",
        "Verifying output",
    ]
}

/// Task-type-specific step list used by the batch executor.
pub fn decompose(task_type: TaskType) -> Vec<&'static str> {
    match task_type {
        TaskType::CodeGeneration => vec![
            "Analyzing requirements",
            "Designing structure",
            "Generating code",
            "Verifying output",
        ],
        TaskType::Refactoring => vec![
            "Analyzing current code",
            "Planning refactor",
            "Applying changes",
            "Checking behavior preserved",
        ],
        TaskType::BugFix => vec![
            "Reproducing issue",
            "Locating root cause",
            "Applying fix",
            "Verifying fix",
        ],
        TaskType::TestGeneration => vec![
            "Analyzing code under test",
            "Identifying cases",
            "Writing tests",
        ],
        TaskType::Documentation => vec!["Reading code", "Writing documentation"],
        TaskType::CodeReview => vec!["Reading changes", "Collecting findings", "Writing review"],
        TaskType::Research => vec!["Gathering sources", "Summarizing findings"],
        // Generic fallback for unrecognized work.
        TaskType::Custom => vec!["Analyzing", "Executing", "Verifying"],
    }
}
