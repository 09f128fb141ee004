//! Error types for the confirmation engine.
//!
//! A transaction that merely fails to observe its effect is not an error: it
//! returns `Ok(false)`. These types are reserved for faults in the engine or
//! its collaborators.

/// Failure of a world-state read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    #[error("World state unavailable: {0}")]
    Unavailable(String),
    #[error("World query failed: {0}")]
    Query(String),
}

/// Failure of the outbound transport to accept a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Outbound channel closed")]
    Closed,
    #[error("Transport rejected command: {0}")]
    Rejected(String),
}

/// Faults raised by engine primitives and transactions.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("World query failed during confirmation: {0}")]
    World(#[from] WorldError),
    #[error("Invalid attempt plan: {0}")]
    InvalidPlan(String),
    #[error("Operation cancelled")]
    Cancelled,
}
