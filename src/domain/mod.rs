//! Domain layer for the scheduling engine.
//!
//! Pure data models, typed events, the error taxonomy, and the ports the
//! embedding application supplies.

pub mod errors;
pub mod events;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
pub use events::{EventBus, TaskEvent};
pub use ports::StepExecutor;
