//! In-memory storage backend.
//!
//! Mirrors the relational semantics closely enough for the engine's tests:
//! aggregate rows are JSON snapshots, row locks are per-identity async
//! mutexes held until commit or drop, and writes stage inside the unit of
//! work before landing atomically at commit. Intended for tests/dev. Not
//! optimized for performance.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use daybook_core::{Aggregate, AggregateId, EventError, EventId, EventResult};
use daybook_events::{EventRecord, StoredEvent};

use super::r#trait::{AggregateStore, AggregateUow};

type RowLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug, Default)]
struct MemoryInner {
    aggregates: RwLock<HashMap<AggregateId, Value>>,
    events: RwLock<Vec<StoredEvent>>,
    row_locks: Mutex<HashMap<AggregateId, RowLock>>,
    locks_taken: AtomicU64,
}

/// Shared in-memory store; clones see the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deserialize the committed snapshot for `id`.
    pub fn load<A>(&self, id: AggregateId) -> EventResult<Option<A>>
    where
        A: DeserializeOwned,
    {
        let rows = self
            .inner
            .aggregates
            .read()
            .map_err(|_| EventError::persistence("load", "aggregate table poisoned"))?;
        match rows.get(&id) {
            Some(snapshot) => {
                let aggregate = serde_json::from_value(snapshot.clone())
                    .map_err(|e| EventError::persistence("load", e))?;
                Ok(Some(aggregate))
            }
            None => Ok(None),
        }
    }

    /// Total number of committed event rows, across all aggregates.
    pub fn event_count(&self) -> EventResult<usize> {
        let log = self
            .inner
            .events
            .read()
            .map_err(|_| EventError::persistence("event_count", "event log poisoned"))?;
        Ok(log.len())
    }

    /// Number of row locks taken since construction.
    pub fn locks_taken(&self) -> u64 {
        self.inner.locks_taken.load(Ordering::Relaxed)
    }
}

/// Unit of work over [`MemoryStore`].
///
/// Holds at most one staged aggregate snapshot and one staged event; both
/// land in the shared maps at [`AggregateUow::commit`] and evaporate if the
/// value is dropped instead.
pub struct MemoryUow<A> {
    inner: Arc<MemoryInner>,
    staged_aggregate: Option<(AggregateId, Value)>,
    staged_event: Option<StoredEvent>,
    row_guard: Option<tokio::sync::OwnedMutexGuard<()>>,
    _aggregate: PhantomData<fn() -> A>,
}

#[async_trait]
impl<A> AggregateStore<A> for MemoryStore
where
    A: Aggregate + Serialize + DeserializeOwned,
{
    type Uow = MemoryUow<A>;

    async fn begin(&self) -> EventResult<Self::Uow> {
        Ok(MemoryUow {
            inner: self.inner.clone(),
            staged_aggregate: None,
            staged_event: None,
            row_guard: None,
            _aggregate: PhantomData,
        })
    }

    async fn events_newest_first(
        &self,
        aggregate_id: AggregateId,
    ) -> EventResult<Vec<StoredEvent>> {
        let log = self
            .inner
            .events
            .read()
            .map_err(|_| EventError::persistence("events_newest_first", "event log poisoned"))?;
        let mut events: Vec<StoredEvent> = log
            .iter()
            .filter(|event| event.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        // Same ordering the relational backend produces.
        events.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_uuid().cmp(a.id.as_uuid()))
        });
        Ok(events)
    }
}

#[async_trait]
impl<A> AggregateUow<A> for MemoryUow<A>
where
    A: Aggregate + Serialize + DeserializeOwned,
{
    async fn lock_and_refresh(&mut self, aggregate: &mut A) -> EventResult<()> {
        let Some(id) = aggregate.id() else {
            return Err(EventError::persistence(
                "lock_and_refresh",
                "aggregate has no identity",
            ));
        };

        let lock = {
            let mut locks = self
                .inner
                .row_locks
                .lock()
                .map_err(|_| EventError::lock_timeout("row lock table poisoned"))?;
            locks.entry(id).or_default().clone()
        };
        self.row_guard = Some(lock.lock_owned().await);
        self.inner.locks_taken.fetch_add(1, Ordering::Relaxed);

        let snapshot = {
            let rows = self
                .inner
                .aggregates
                .read()
                .map_err(|_| EventError::persistence("lock_and_refresh", "aggregate table poisoned"))?;
            rows.get(&id).cloned()
        };
        let Some(snapshot) = snapshot else {
            return Err(EventError::persistence(
                "lock_and_refresh",
                format!("no aggregate row for {id}"),
            ));
        };
        *aggregate = serde_json::from_value(snapshot)
            .map_err(|e| EventError::persistence("lock_and_refresh", e))?;
        Ok(())
    }

    async fn save_aggregate(&mut self, aggregate: &mut A) -> EventResult<AggregateId> {
        let id = match aggregate.id() {
            Some(id) => id,
            None => {
                let id = AggregateId::new();
                aggregate.assign_id(id);
                id
            }
        };
        let snapshot = serde_json::to_value(&*aggregate)
            .map_err(|e| EventError::persistence("save_aggregate", e))?;
        self.staged_aggregate = Some((id, snapshot));
        Ok(id)
    }

    async fn insert_event(&mut self, record: &EventRecord) -> EventResult<StoredEvent> {
        let Some(aggregate_id) = record.aggregate_id() else {
            return Err(EventError::persistence(
                "insert_event",
                "event row needs an aggregate id",
            ));
        };
        let Some(created_at) = record.created_at() else {
            return Err(EventError::persistence(
                "insert_event",
                "event row needs a creation time",
            ));
        };

        let stored = StoredEvent {
            id: EventId::new(),
            aggregate_id,
            handler_type: record.handler_type().to_owned(),
            data: record.data().clone(),
            metadata: record.metadata().clone(),
            created_at,
        };
        self.staged_event = Some(stored.clone());
        Ok(stored)
    }

    async fn commit(self) -> EventResult<()> {
        let MemoryUow {
            inner,
            staged_aggregate,
            staged_event,
            row_guard: _row_guard,
            ..
        } = self;

        // Both tables under write locks before either write applies.
        let mut rows = inner
            .aggregates
            .write()
            .map_err(|_| EventError::persistence("commit", "aggregate table poisoned"))?;
        let mut log = inner
            .events
            .write()
            .map_err(|_| EventError::persistence("commit", "event log poisoned"))?;

        if let Some((id, snapshot)) = staged_aggregate {
            rows.insert(id, snapshot);
        }
        if let Some(event) = staged_event {
            log.push(event);
        }
        Ok(())
    }
}
