//! Event handler contract.

use crate::payload::Payload;

/// Applies one named event to an aggregate.
///
/// A handler is transient: constructed from an event record's payload, asked
/// to mutate the in-memory aggregate, then discarded. One concrete type exists
/// per (aggregate type, event name) pair, named by
/// [`crate::registry::handler_type_name`] and wired up through
/// [`crate::registry::HandlerRegistry::register`].
///
/// ## Design Philosophy
///
/// Handlers are **pure state transitions**: no IO, no storage access, no
/// failure path. Everything fallible (payload deserialization, locking,
/// persistence) happens around `apply`, so a handler that has been
/// constructed always applies.
pub trait EventHandler<A>: Send {
    /// Mutate the in-memory aggregate. Storage happens around this call.
    fn apply(&self, aggregate: &mut A);

    /// Metadata derived by the handler, shallow-merged into the record's
    /// metadata on every application. Handler keys win over ambient keys.
    fn metadata(&self) -> Payload {
        Payload::new()
    }
}
