//! Typed lifecycle events.
//!
//! The scheduling components publish every status transition here so that
//! observers (metrics, presentation layers) stay decoupled from scheduling.
//! The event set is a closed tagged union rather than free-form string
//! topics, so handlers can be checked for exhaustiveness.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::models::task::TaskStatus;

/// A lifecycle event carrying the full status snapshot of the task it
/// concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A task was accepted and a status record created.
    Submitted {
        /// Snapshot at submission time.
        status: TaskStatus,
    },
    /// A task or one of its steps changed state or progress.
    Updated {
        /// Snapshot after the transition.
        status: TaskStatus,
    },
}

impl TaskEvent {
    /// The status snapshot carried by the event.
    pub fn status(&self) -> &TaskStatus {
        match self {
            Self::Submitted { status } | Self::Updated { status } => status,
        }
    }
}

/// Process-wide publish/subscribe bus for [`TaskEvent`]s.
///
/// Backed by a broadcast channel; emitting with no subscribers is fine.
/// Events for one task are emitted in transition order; no ordering is
/// guaranteed between different tasks.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    /// Create a bus with the given buffered capacity per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Dropped silently when no subscriber is listening.
    pub fn emit(&self, event: TaskEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
