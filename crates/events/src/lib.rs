//! `daybook-events` — event records, handler resolution, and ambient metadata.
//!
//! Everything here is storage-agnostic: records are built and mutated in
//! memory, handlers are resolved through an explicit registry, and contextual
//! metadata is scoped to the running task.

pub mod context;
pub mod handler;
pub mod payload;
pub mod record;
pub mod registry;

pub use handler::EventHandler;
pub use payload::{Payload, shallow_merge};
pub use record::{EventRecord, StoredEvent};
pub use registry::{HandlerFactory, HandlerRegistry, handler_type_name};
