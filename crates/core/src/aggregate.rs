//! Aggregate contract for event-driven domain models.

use chrono::{DateTime, Utc};

use crate::id::AggregateId;

/// A mutable domain entity whose state changes are driven by applied events.
///
/// Implementations own their field layout and storage mapping. The engine only
/// reads the identity, hands the value to handlers for mutation, and stamps
/// the optional timestamp capabilities below. It never constructs aggregates.
pub trait Aggregate: Send + 'static {
    /// Namespaced type name used to compute handler type names
    /// (e.g. `"User"`, `"billing.Account"`).
    const KIND: &'static str;

    /// Durable identity. `None` until first persisted.
    fn id(&self) -> Option<AggregateId>;

    /// Called by storage when the first save assigns an identity.
    fn assign_id(&mut self, id: AggregateId);

    /// Creation-timestamp capability.
    ///
    /// Return a handle to the field to opt in. The default opts out, and the
    /// engine skips creation stamping for this type entirely.
    fn created_at_mut(&mut self) -> Option<&mut Option<DateTime<Utc>>> {
        None
    }

    /// Update-timestamp capability. Same opt-in shape as [`Aggregate::created_at_mut`].
    fn updated_at_mut(&mut self) -> Option<&mut Option<DateTime<Utc>>> {
        None
    }
}
