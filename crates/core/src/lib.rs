//! `daybook-core` — foundation types for the event-append pipeline.
//!
//! This crate contains **pure domain** primitives (no storage concerns).

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod id;

pub use aggregate::Aggregate;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{EventError, EventResult};
pub use id::{AggregateId, EventId, ParseIdError};
