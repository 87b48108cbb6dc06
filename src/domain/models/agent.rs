//! Agent domain model.
//!
//! An agent is a worker identity drawn from a bounded pool. It is assigned
//! to at most one task at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role an agent specializes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Architect,
    Backend,
    Frontend,
    Test,
    Doc,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Architect => write!(f, "architect"),
            Self::Backend => write!(f, "backend"),
            Self::Frontend => write!(f, "frontend"),
            Self::Test => write!(f, "test"),
            Self::Doc => write!(f, "doc"),
        }
    }
}

impl FromStr for AgentRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "architect" => Ok(Self::Architect),
            "backend" => Ok(Self::Backend),
            "frontend" => Ok(Self::Frontend),
            "test" => Ok(Self::Test),
            "doc" => Ok(Self::Doc),
            _ => Err(anyhow::anyhow!("Invalid agent role: {s}")),
        }
    }
}

/// Agent status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Busy,
    Error,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Busy => write!(f, "busy"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A worker identity in the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent identifier.
    pub id: Uuid,
    /// Human-readable name, e.g. `agent-2`.
    pub name: String,
    /// Role specialization.
    pub role: AgentRole,
    /// Current status.
    pub state: AgentState,
    /// Id of the task this agent is working on. Set while busy.
    pub current_task: Option<Uuid>,
    /// Monotonically increasing completion counter.
    pub tasks_completed: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Create a new idle agent.
    pub fn new(name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            state: AgentState::Idle,
            current_task: None,
            tasks_completed: 0,
            created_at: Utc::now(),
        }
    }

    /// Whether this agent can be handed out by the pool.
    pub fn is_available(&self) -> bool {
        self.state == AgentState::Idle
    }

    /// Reserve the agent. Called under the pool lock so a reserved agent
    /// is never handed to a second caller.
    pub fn reserve(&mut self) {
        self.state = AgentState::Busy;
    }

    /// Record the task the agent is working on.
    pub fn assign(&mut self, task_id: Uuid) {
        self.state = AgentState::Busy;
        self.current_task = Some(task_id);
    }

    /// Return the agent to the idle state and count the completion.
    pub fn release(&mut self) {
        self.state = AgentState::Idle;
        self.current_task = None;
        self.tasks_completed += 1;
    }

    /// Put the agent into the error state. An errored agent is never
    /// returned by acquire until explicitly reset.
    pub fn mark_error(&mut self) {
        self.state = AgentState::Error;
        self.current_task = None;
    }

    /// Reset an errored agent back to idle.
    pub fn reset(&mut self) {
        self.state = AgentState::Idle;
        self.current_task = None;
    }
}
