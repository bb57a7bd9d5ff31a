//! Event records, before and after persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use daybook_core::{Aggregate, AggregateId, EventId};

use crate::context;
use crate::payload::{Payload, shallow_merge};
use crate::registry::handler_type_name;

/// An event captured in memory, not yet persisted.
///
/// Construction computes the handler type name and snapshots the ambient
/// contextual metadata; the engine later merges handler-derived metadata,
/// stamps the creation time, and fills in the aggregate identity before the
/// row is inserted. The event name itself is consumed during construction and
/// never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    handler_type: String,
    aggregate_id: Option<AggregateId>,
    data: Payload,
    metadata: Payload,
    created_at: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// Record `event_name` against `aggregate` with an empty data payload.
    pub fn new<A: Aggregate>(aggregate: &A, event_name: &str) -> Self {
        Self::with_data(aggregate, event_name, Payload::new())
    }

    /// Record `event_name` against `aggregate` carrying `data`.
    ///
    /// The metadata starts as a snapshot of [`context::current`]; later scope
    /// changes do not reach back into this record.
    pub fn with_data<A: Aggregate>(aggregate: &A, event_name: &str, data: Payload) -> Self {
        Self {
            handler_type: handler_type_name(A::KIND, event_name),
            aggregate_id: aggregate.id(),
            data,
            metadata: context::current(),
            created_at: None,
        }
    }

    pub fn handler_type(&self) -> &str {
        &self.handler_type
    }

    pub fn aggregate_id(&self) -> Option<AggregateId> {
        self.aggregate_id
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn metadata(&self) -> &Payload {
        &self.metadata
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Shallow-merge `extra` into the record metadata; `extra` keys win.
    pub fn merge_metadata(&mut self, extra: &Payload) {
        shallow_merge(&mut self.metadata, extra);
    }

    /// Stamp the creation time. The first call wins; later calls are no-ops.
    pub fn stamp_created_at(&mut self, now: DateTime<Utc>) {
        self.created_at.get_or_insert(now);
    }

    /// Attach the aggregate's durable identity once storage has assigned it.
    /// Keeps an identity captured at construction time.
    pub fn assign_aggregate(&mut self, id: AggregateId) {
        self.aggregate_id.get_or_insert(id);
    }
}

/// A durable event row.
///
/// ## Append-only
///
/// Rows are inserted by the engine and never updated or deleted afterwards;
/// every field is concrete by the time a value of this type exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Storage-assigned event identity.
    pub id: EventId,
    /// Owning aggregate row.
    pub aggregate_id: AggregateId,
    /// Fully-qualified handler type name, e.g. `"User.RegisteredEvent"`.
    pub handler_type: String,
    /// Event payload exactly as supplied at append time.
    pub data: Payload,
    /// Ambient context merged with handler-derived metadata.
    pub metadata: Payload,
    /// Engine-stamped creation time.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{Value, json};

    #[derive(Debug, Default)]
    struct Ticket {
        id: Option<AggregateId>,
    }

    impl Aggregate for Ticket {
        const KIND: &'static str = "support.Ticket.EventStore";

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn assign_id(&mut self, id: AggregateId) {
            self.id = Some(id);
        }
    }

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            other => panic!("expected JSON object, got: {other:?}"),
        }
    }

    #[test]
    fn construction_fills_every_field_it_can() {
        let ticket = Ticket::default();
        let record = EventRecord::with_data(&ticket, "opened", payload(json!({"owner": "ops"})));

        assert_eq!(record.handler_type(), "support.Ticket.OpenedEvent");
        assert_eq!(record.aggregate_id(), None);
        assert_eq!(record.data(), &payload(json!({"owner": "ops"})));
        assert!(record.metadata().is_empty());
        assert_eq!(record.created_at(), None);
    }

    #[test]
    fn construction_captures_a_persisted_identity() {
        let mut ticket = Ticket::default();
        let id = AggregateId::new();
        ticket.assign_id(id);

        let record = EventRecord::new(&ticket, "opened");
        assert_eq!(record.aggregate_id(), Some(id));
    }

    #[test]
    fn metadata_snapshots_the_ambient_context() {
        let record = context::with_scope_sync(payload(json!({"tenant": "acme"})), || {
            EventRecord::new(&Ticket::default(), "opened")
        });

        // The scope is gone; the snapshot is not.
        assert!(context::current().is_empty());
        assert_eq!(record.metadata(), &payload(json!({"tenant": "acme"})));
    }

    #[test]
    fn merged_metadata_prefers_the_incoming_keys() {
        let mut record = context::with_scope_sync(payload(json!({"actor": "ambient"})), || {
            EventRecord::new(&Ticket::default(), "opened")
        });

        record.merge_metadata(&payload(json!({"actor": "handler", "request_id": 1})));

        assert_eq!(
            record.metadata(),
            &payload(json!({"actor": "handler", "request_id": 1}))
        );
    }

    #[test]
    fn creation_stamp_is_set_once() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap();

        let mut record = EventRecord::new(&Ticket::default(), "opened");
        record.stamp_created_at(t1);
        record.stamp_created_at(t2);

        assert_eq!(record.created_at(), Some(t1));
    }

    #[test]
    fn aggregate_identity_is_kept_once_assigned() {
        let first = AggregateId::new();
        let second = AggregateId::new();

        let mut record = EventRecord::new(&Ticket::default(), "opened");
        record.assign_aggregate(first);
        record.assign_aggregate(second);

        assert_eq!(record.aggregate_id(), Some(first));
    }
}
