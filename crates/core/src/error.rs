//! Error model for the event-append pipeline.

use thiserror::Error;

/// Result type used across the engine.
pub type EventResult<T> = Result<T, EventError>;

/// Failure of the event-append pipeline.
///
/// Every variant aborts the surrounding unit of work; there is no local
/// recovery and no partial success. Storage backends map their native errors
/// onto these variants instead of leaking driver types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// No handler is registered under the computed handler type name.
    #[error("no handler registered for '{0}'")]
    HandlerNotFound(String),

    /// Event-table wiring does not reference exactly one aggregate.
    #[error("invalid aggregate relationship: {0}")]
    InvalidAggregateRelationship(String),

    /// The event payload does not match the handler's shape.
    #[error("event payload mismatch: {0}")]
    Deserialize(String),

    /// Storage rejected a write, or a required row is missing.
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    /// The aggregate row lock could not be acquired.
    #[error("aggregate row lock unavailable: {0}")]
    LockTimeout(String),
}

impl EventError {
    pub fn handler_not_found(handler_type: impl Into<String>) -> Self {
        Self::HandlerNotFound(handler_type.into())
    }

    pub fn relationship(detail: impl Into<String>) -> Self {
        Self::InvalidAggregateRelationship(detail.into())
    }

    pub fn deserialize(handler_type: &str, err: impl core::fmt::Display) -> Self {
        Self::Deserialize(format!("{handler_type}: {err}"))
    }

    pub fn persistence(operation: &str, err: impl core::fmt::Display) -> Self {
        Self::PersistenceFailed(format!("{operation}: {err}"))
    }

    pub fn lock_timeout(detail: impl Into<String>) -> Self {
        Self::LockTimeout(detail.into())
    }
}
