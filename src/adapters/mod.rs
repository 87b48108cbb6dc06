//! Adapters: concrete implementations of the domain ports.

pub mod simulated;

pub use simulated::SimulatedStepExecutor;
