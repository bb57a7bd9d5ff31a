//! Unit-of-work contract between the engine and its storage backends.

use std::sync::Arc;

use async_trait::async_trait;

use daybook_core::{Aggregate, AggregateId, EventResult};
use daybook_events::{EventRecord, StoredEvent};

/// One atomic application of an event to an aggregate.
///
/// A unit of work brackets a single engine run: lock, save, insert, commit.
/// Nothing staged through it becomes durable before [`AggregateUow::commit`],
/// and dropping the value without committing discards every staged write and
/// releases any held lock.
#[async_trait]
pub trait AggregateUow<A: Aggregate>: Send {
    /// Take an exclusive lock on the aggregate's row for the remainder of
    /// this unit of work, then overwrite the in-memory value with the state
    /// the locked row holds.
    ///
    /// Lock and refresh are one operation: after it returns, the in-memory
    /// aggregate matches what the previous lock holder committed.
    async fn lock_and_refresh(&mut self, aggregate: &mut A) -> EventResult<()>;

    /// Insert or update the aggregate row, assigning the identity on first
    /// save. Returns the durable identity either way.
    async fn save_aggregate(&mut self, aggregate: &mut A) -> EventResult<AggregateId>;

    /// Append the event row. Storage assigns the event identity and returns
    /// the durable form.
    async fn insert_event(&mut self, record: &EventRecord) -> EventResult<StoredEvent>;

    /// Make every staged write durable at once.
    async fn commit(self) -> EventResult<()>;
}

/// A backend able to open units of work over aggregates of type `A`.
#[async_trait]
pub trait AggregateStore<A: Aggregate>: Send + Sync {
    type Uow: AggregateUow<A>;

    /// Open a fresh unit of work.
    async fn begin(&self) -> EventResult<Self::Uow>;

    /// The aggregate's events, newest first.
    async fn events_newest_first(
        &self,
        aggregate_id: AggregateId,
    ) -> EventResult<Vec<StoredEvent>>;
}

#[async_trait]
impl<A, S> AggregateStore<A> for Arc<S>
where
    A: Aggregate,
    S: AggregateStore<A>,
{
    type Uow = S::Uow;

    async fn begin(&self) -> EventResult<Self::Uow> {
        (**self).begin().await
    }

    async fn events_newest_first(
        &self,
        aggregate_id: AggregateId,
    ) -> EventResult<Vec<StoredEvent>> {
        (**self).events_newest_first(aggregate_id).await
    }
}
