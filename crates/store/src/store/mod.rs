//! Storage abstraction for aggregates and their event rows.

pub mod memory;
pub mod postgres;
pub mod r#trait;

pub use memory::{MemoryStore, MemoryUow};
pub use postgres::{PgPersist, PgStore, PgUow};
pub use r#trait::{AggregateStore, AggregateUow};
