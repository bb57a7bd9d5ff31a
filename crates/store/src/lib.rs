//! `daybook-store` — storage backends and the event application engine.
//!
//! The engine applies event records to aggregates and persists both sides in
//! one unit of work; backends (in-memory for tests/dev, Postgres for
//! production) realize the unit of work over their own locking and
//! transaction primitives.

pub mod binding;
pub mod daybook;
pub mod engine;
pub mod store;


pub use binding::EventTableBinding;
pub use daybook::Daybook;
pub use engine::EventEngine;
pub use store::{AggregateStore, AggregateUow, MemoryStore, PgPersist, PgStore};
