//! Per-aggregate facade over the engine.

use std::sync::Arc;

use daybook_core::{Aggregate, Clock, EventResult};
use daybook_events::{EventRecord, HandlerRegistry, Payload, StoredEvent};

use crate::engine::EventEngine;
use crate::store::AggregateStore;

/// Entry point for appending events to aggregates of one type.
///
/// Owns the engine wiring (store, registry, clock) so callers only deal in
/// aggregates, event names, and payloads.
pub struct Daybook<A: Aggregate, S: AggregateStore<A>> {
    engine: EventEngine<A, S>,
}

impl<A, S> Daybook<A, S>
where
    A: Aggregate,
    S: AggregateStore<A>,
{
    pub fn new(store: S, registry: HandlerRegistry<A>) -> Self {
        Self {
            engine: EventEngine::new(store, registry),
        }
    }

    pub fn with_clock(store: S, registry: HandlerRegistry<A>, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine: EventEngine::with_clock(store, registry, clock),
        }
    }

    /// Append `event_name` with `data` to `aggregate`.
    ///
    /// Builds the record (snapshotting the ambient metadata), applies the
    /// resolved handler, and persists aggregate and event atomically.
    /// Returns the durable event row.
    pub async fn create_event(
        &self,
        aggregate: &mut A,
        event_name: &str,
        data: Payload,
    ) -> EventResult<StoredEvent> {
        let mut record = EventRecord::with_data(aggregate, event_name, data);
        self.engine.apply_and_persist(aggregate, &mut record).await
    }

    /// The aggregate's events, newest first. Empty for an aggregate that has
    /// never been persisted.
    pub async fn events(&self, aggregate: &A) -> EventResult<Vec<StoredEvent>> {
        match aggregate.id() {
            Some(id) => self.engine.store().events_newest_first(id).await,
            None => Ok(Vec::new()),
        }
    }
}
