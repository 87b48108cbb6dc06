//! Application layer: composition of the service components.

pub mod engine;

pub use engine::Engine;
