//! The event application engine.

use std::sync::Arc;

use daybook_core::{Aggregate, Clock, EventResult, SystemClock};
use daybook_events::{EventRecord, HandlerRegistry, StoredEvent};

use crate::store::{AggregateStore, AggregateUow};

/// Applies event records to aggregates and persists both sides atomically.
///
/// ```text
/// begin -> resolve handler -> lock & refresh -> apply -> merge metadata
///       -> stamp times -> save aggregate -> insert event -> commit
/// ```
///
/// Everything between begin and commit runs on one unit of work; any failure
/// (or dropping the in-flight future) rolls the whole application back.
pub struct EventEngine<A: Aggregate, S: AggregateStore<A>> {
    store: S,
    registry: HandlerRegistry<A>,
    clock: Arc<dyn Clock>,
}

impl<A, S> EventEngine<A, S>
where
    A: Aggregate,
    S: AggregateStore<A>,
{
    /// Engine over `store` with the wall clock.
    pub fn new(store: S, registry: HandlerRegistry<A>) -> Self {
        Self::with_clock(store, registry, Arc::new(SystemClock))
    }

    /// Engine with an explicit time source.
    pub fn with_clock(store: S, registry: HandlerRegistry<A>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            registry,
            clock,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Apply `record` to `aggregate` and persist both in one unit of work.
    ///
    /// A persisted aggregate is locked and refreshed first, so concurrent
    /// callers serialize and each applies on top of the previous committed
    /// state. A brand-new aggregate (no identity yet) skips the lock; its
    /// identity is assigned by the save and copied onto the record before
    /// the event row is inserted.
    pub async fn apply_and_persist(
        &self,
        aggregate: &mut A,
        record: &mut EventRecord,
    ) -> EventResult<StoredEvent> {
        // 1) Everything below shares one unit of work.
        let mut uow = self.store.begin().await?;

        // 2) Resolve the handler before touching any state.
        let factory = self.registry.resolve(record.handler_type())?;

        // 3) Single-writer guard. Only rows that exist can be locked.
        let was_persisted = aggregate.id().is_some();
        if was_persisted {
            uow.lock_and_refresh(aggregate).await?;
        }

        // 4) Build the handler from the event payload and run it.
        let handler = factory(record.data())?;
        handler.apply(aggregate);

        // 5) Handler metadata wins over the ambient snapshot, every time.
        record.merge_metadata(&handler.metadata());

        // 6) One instant stamps the record and both aggregate timestamps.
        let now = self.clock.now();
        record.stamp_created_at(now);
        if !was_persisted {
            if let Some(created_at) = aggregate.created_at_mut() {
                created_at.get_or_insert(now);
            }
        }
        if let Some(updated_at) = aggregate.updated_at_mut() {
            *updated_at = Some(now);
        }

        // 7) Aggregate row first; the event row's foreign key needs it.
        let aggregate_id = uow.save_aggregate(aggregate).await?;
        record.assign_aggregate(aggregate_id);

        // 8) Event row last; storage assigns its identity.
        let stored = uow.insert_event(record).await?;

        uow.commit().await?;
        Ok(stored)
    }
}
