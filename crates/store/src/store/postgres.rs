//! Postgres-backed storage.
//!
//! The unit of work is a `sqlx` transaction: the aggregate row is locked and
//! refreshed with `SELECT ... FOR UPDATE`, both writes run on the same
//! transaction, and dropping the transaction without commit rolls back.
//! Event-table SQL lives here; the aggregate's own table belongs to the
//! application, which supplies it through [`PgPersist`].
//!
//! ## Error Mapping
//!
//! sqlx errors are mapped to `EventError` as follows:
//!
//! | sqlx error | PostgreSQL code | EventError | Scenario |
//! |------------|-----------------|------------|----------|
//! | Database | `55P03` (lock_not_available) | `LockTimeout` | Row lock unavailable (`lock_timeout`, `NOWAIT`) |
//! | Database | `40P01` (deadlock_detected) | `LockTimeout` | Two units of work blocked on each other |
//! | Database | any other (incl. `23xxx` constraints) | `PersistenceFailed` | Storage rejected the write |
//! | RowNotFound | n/a | `PersistenceFailed` | A required row is gone |
//! | other | n/a | `PersistenceFailed` | Network, pool, decoding failures |
//!
//! ## Thread Safety
//!
//! `PgStore` is `Send + Sync` and can be shared across tasks; every unit of
//! work owns its own pooled connection.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use daybook_core::{Aggregate, AggregateId, EventError, EventId, EventResult};
use daybook_events::{EventRecord, Payload, StoredEvent};

use crate::binding::EventTableBinding;

use super::r#trait::{AggregateStore, AggregateUow};

/// Application-side persistence for the aggregate's own table.
///
/// The engine never sees the aggregate's columns; implementations supply the
/// three statements the unit of work runs against its transaction.
#[async_trait]
pub trait PgPersist: Aggregate {
    /// Insert a new row, generating and assigning the identity. After this
    /// returns, [`Aggregate::id`] is `Some`.
    async fn insert(&mut self, conn: &mut PgConnection) -> Result<AggregateId, sqlx::Error>;

    /// Update the existing row.
    async fn update(&mut self, conn: &mut PgConnection) -> Result<(), sqlx::Error>;

    /// `SELECT ... FOR UPDATE` the row and overwrite the in-memory fields
    /// with the locked row's state.
    async fn lock_refresh(&mut self, conn: &mut PgConnection) -> Result<(), sqlx::Error>;
}

/// Postgres-backed [`AggregateStore`].
pub struct PgStore<A: PgPersist> {
    pool: Arc<PgPool>,
    binding: EventTableBinding,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A: PgPersist> Clone for PgStore<A> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            binding: self.binding.clone(),
            _aggregate: PhantomData,
        }
    }
}

impl<A: PgPersist> PgStore<A> {
    /// Store over `pool` with the conventional wiring derived from
    /// [`Aggregate::KIND`].
    pub fn new(pool: PgPool) -> EventResult<Self> {
        Ok(Self::with_binding(
            pool,
            EventTableBinding::for_aggregate::<A>()?,
        ))
    }

    /// Store with explicit event-table wiring.
    pub fn with_binding(pool: PgPool, binding: EventTableBinding) -> Self {
        Self {
            pool: Arc::new(pool),
            binding,
            _aggregate: PhantomData,
        }
    }

    pub fn binding(&self) -> &EventTableBinding {
        &self.binding
    }

    /// Create the event table and its listing index if absent.
    ///
    /// The aggregate's own table is the application's concern.
    #[instrument(skip(self), fields(table = %self.binding.table()), err)]
    pub async fn migrate(&self) -> EventResult<()> {
        let table = self.binding.table();
        let fk = self.binding.aggregate_fk();

        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY,
                handler_type TEXT NOT NULL,
                {fk} UUID NOT NULL,
                data JSONB NOT NULL DEFAULT '{{}}',
                metadata JSONB NOT NULL DEFAULT '{{}}',
                created_at TIMESTAMPTZ NOT NULL
            )
            "#
        );
        sqlx::query(&ddl)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_{fk}_created_at \
             ON {table} ({fk}, created_at DESC)"
        );
        sqlx::query(&index)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl<A: PgPersist> AggregateStore<A> for PgStore<A> {
    type Uow = PgUow<A>;

    async fn begin(&self) -> EventResult<Self::Uow> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(PgUow {
            tx,
            binding: self.binding.clone(),
            _aggregate: PhantomData,
        })
    }

    #[instrument(
        skip_all,
        fields(
            table = tracing::field::Empty,
            aggregate_id = tracing::field::Empty,
            event_count = tracing::field::Empty
        ),
        err
    )]
    async fn events_newest_first(
        &self,
        aggregate_id: AggregateId,
    ) -> EventResult<Vec<StoredEvent>> {
        let span = Span::current();
        span.record("table", self.binding.table());
        span.record(
            "aggregate_id",
            tracing::field::display(aggregate_id.as_uuid()),
        );

        let sql = format!(
            r#"
            SELECT id, {fk} AS aggregate_id, handler_type, data, metadata, created_at
            FROM {table}
            WHERE {fk} = $1
            ORDER BY created_at DESC, id DESC
            "#,
            table = self.binding.table(),
            fk = self.binding.aggregate_fk(),
        );
        let rows = sqlx::query(&sql)
            .bind(aggregate_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("events_newest_first", e))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let event =
                EventRow::from_row(&row).map_err(|e| map_sqlx_error("events_newest_first", e))?;
            events.push(event.into());
        }
        span.record("event_count", events.len());
        Ok(events)
    }
}

/// A `sqlx` transaction plus the event-table wiring.
///
/// Dropping without commit rolls the transaction back.
pub struct PgUow<A: PgPersist> {
    tx: Transaction<'static, Postgres>,
    binding: EventTableBinding,
    _aggregate: PhantomData<fn() -> A>,
}

#[async_trait]
impl<A: PgPersist> AggregateUow<A> for PgUow<A> {
    #[instrument(skip_all, fields(aggregate_id = tracing::field::Empty), err)]
    async fn lock_and_refresh(&mut self, aggregate: &mut A) -> EventResult<()> {
        if let Some(id) = aggregate.id() {
            Span::current().record("aggregate_id", tracing::field::display(id.as_uuid()));
        }
        aggregate
            .lock_refresh(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_and_refresh", e))
    }

    #[instrument(skip_all, fields(aggregate_id = tracing::field::Empty), err)]
    async fn save_aggregate(&mut self, aggregate: &mut A) -> EventResult<AggregateId> {
        let id = match aggregate.id() {
            Some(id) => {
                aggregate
                    .update(&mut *self.tx)
                    .await
                    .map_err(|e| map_sqlx_error("save_aggregate", e))?;
                id
            }
            None => aggregate
                .insert(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("save_aggregate", e))?,
        };
        Span::current().record("aggregate_id", tracing::field::display(id.as_uuid()));
        Ok(id)
    }

    #[instrument(
        skip_all,
        fields(handler_type = tracing::field::Empty, event_id = tracing::field::Empty),
        err
    )]
    async fn insert_event(&mut self, record: &EventRecord) -> EventResult<StoredEvent> {
        let span = Span::current();
        span.record("handler_type", record.handler_type());

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

        let id = EventId::new();
        let sql = format!(
            r#"
            INSERT INTO {table} (id, handler_type, {fk}, data, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            table = self.binding.table(),
            fk = self.binding.aggregate_fk(),
        );
        sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(record.handler_type())
            .bind(aggregate_id.as_uuid())
            .bind(Value::Object(record.data().clone()))
            .bind(Value::Object(record.metadata().clone()))
            .bind(created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_event", e))?;
        span.record("event_id", tracing::field::display(id.as_uuid()));

        Ok(StoredEvent {
            id,
            aggregate_id,
            handler_type: record.handler_type().to_owned(),
            data: record.data().clone(),
            metadata: record.metadata().clone(),
            created_at,
        })
    }

    async fn commit(self) -> EventResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

/// Map driver errors onto the engine's taxonomy.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // lock_not_available (lock_timeout / NOWAIT)
                Some("55P03") => EventError::LockTimeout(msg),
                // deadlock_detected
                Some("40P01") => EventError::LockTimeout(msg),
                _ => EventError::PersistenceFailed(msg),
            }
        }
        sqlx::Error::RowNotFound => EventError::persistence(operation, "row not found"),
        other => EventError::persistence(operation, other),
    }
}

// SQLx row types

#[derive(Debug)]
struct EventRow {
    id: Uuid,
    aggregate_id: Uuid,
    handler_type: String,
    data: Value,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, sqlx::postgres::PgRow> for EventRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            id: row.try_get("id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            handler_type: row.try_get("handler_type")?,
            data: row.try_get("data")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        StoredEvent {
            id: EventId::from_uuid(row.id),
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            handler_type: row.handler_type,
            data: object_or_empty(row.data),
            metadata: object_or_empty(row.metadata),
            created_at: row.created_at,
        }
    }
}

/// Columns default to `'{}'::jsonb`; anything non-object reads as empty.
fn object_or_empty(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct User {
        id: Option<AggregateId>,
    }

    impl Aggregate for User {
        const KIND: &'static str = "User";

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn assign_id(&mut self, id: AggregateId) {
            self.id = Some(id);
        }
    }

    #[async_trait]
    impl PgPersist for User {
        async fn insert(&mut self, _conn: &mut PgConnection) -> Result<AggregateId, sqlx::Error> {
            Err(sqlx::Error::RowNotFound)
        }

        async fn update(&mut self, _conn: &mut PgConnection) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::RowNotFound)
        }

        async fn lock_refresh(&mut self, _conn: &mut PgConnection) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::RowNotFound)
        }
    }

    #[tokio::test]
    async fn conventional_wiring_is_derived_from_the_kind() {
        let pool = PgPool::connect_lazy("postgres://localhost/daybook").unwrap();
        let store = PgStore::<User>::new(pool).unwrap();
        assert_eq!(store.binding().table(), "user_event_store");
        assert_eq!(store.binding().aggregate_fk(), "user_id");
    }

    #[test]
    fn non_database_errors_map_to_persistence_failures() {
        match map_sqlx_error("insert_event", sqlx::Error::RowNotFound) {
            EventError::PersistenceFailed(detail) => {
                assert!(detail.contains("row not found"), "{detail}");
            }
            other => panic!("expected PersistenceFailed, got: {other:?}"),
        }

        match map_sqlx_error("begin", sqlx::Error::PoolTimedOut) {
            EventError::PersistenceFailed(detail) => {
                assert!(detail.starts_with("begin:"), "{detail}");
            }
            other => panic!("expected PersistenceFailed, got: {other:?}"),
        }
    }

    #[test]
    fn non_object_json_reads_as_empty_payload() {
        assert!(object_or_empty(Value::Null).is_empty());
        assert_eq!(
            object_or_empty(serde_json::json!({"a": 1}))
                .get("a")
                .and_then(Value::as_i64),
            Some(1)
        );
    }
}
