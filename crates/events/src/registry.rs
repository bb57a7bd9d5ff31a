//! Handler-type naming and the registry that resolves names to constructors.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use daybook_core::{Aggregate, EventError, EventResult};

use crate::handler::EventHandler;
use crate::payload::Payload;

/// Qualifier segment stripped from aggregate kinds during naming.
const STORE_QUALIFIER: &str = ".EventStore";

/// Compute the handler type name for an event on an aggregate kind.
///
/// A trailing `.EventStore` qualifier on the kind is dropped, then the
/// UpperCamelCase event name plus an `Event` suffix is appended:
///
/// - (`"User"`, `"registered"`) → `"User.RegisteredEvent"`
/// - (`"User"`, `"email_changed"`) → `"User.EmailChangedEvent"`
/// - (`"billing.Account.EventStore"`, `"credited"`) → `"billing.Account.CreditedEvent"`
pub fn handler_type_name(aggregate_kind: &str, event_name: &str) -> String {
    format!("{}.{}Event", base_kind(aggregate_kind), upper_camel(event_name))
}

/// The aggregate kind with any trailing `.EventStore` qualifier removed.
pub fn base_kind(aggregate_kind: &str) -> &str {
    aggregate_kind
        .strip_suffix(STORE_QUALIFIER)
        .unwrap_or(aggregate_kind)
}

/// Uppercase the first letter of each `_`-separated word and join them.
fn upper_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for word in name.split('_').filter(|w| !w.is_empty()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Constructor stored per handler type: deserializes an event payload into a
/// concrete handler.
pub type HandlerFactory<A> =
    Box<dyn Fn(&Payload) -> EventResult<Box<dyn EventHandler<A>>> + Send + Sync>;

/// Maps handler type names to constructors for one aggregate type.
///
/// Replaces by-name class lookup: every (event name, handler) pair is wired
/// explicitly at startup, and resolution is a plain map lookup. Registration
/// order is irrelevant; registering an event name again replaces the earlier
/// handler.
pub struct HandlerRegistry<A: Aggregate> {
    factories: HashMap<String, HandlerFactory<A>>,
}

impl<A: Aggregate> Default for HandlerRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Aggregate> HandlerRegistry<A> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register `H` as the handler for `event_name` on `A`.
    ///
    /// The handler type name is computed from [`Aggregate::KIND`]; the stored
    /// factory deserializes an event's data payload into `H`.
    pub fn register<H>(&mut self, event_name: &str) -> &mut Self
    where
        H: EventHandler<A> + DeserializeOwned + 'static,
    {
        let handler_type = handler_type_name(A::KIND, event_name);
        let reported = handler_type.clone();
        let factory: HandlerFactory<A> = Box::new(move |data| {
            let handler: H = serde_json::from_value(Value::Object(data.clone()))
                .map_err(|e| EventError::deserialize(&reported, e))?;
            Ok(Box::new(handler))
        });
        self.factories.insert(handler_type, factory);
        self
    }

    /// Look up the constructor for a handler type name.
    pub fn resolve(&self, handler_type: &str) -> EventResult<&HandlerFactory<A>> {
        self.factories
            .get(handler_type)
            .ok_or_else(|| EventError::handler_not_found(handler_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::AggregateId;
    use proptest::prelude::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct User {
        id: Option<AggregateId>,
        email: String,
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

    #[derive(Debug, Deserialize)]
    struct RegisteredEvent {
        email: String,
    }

    impl EventHandler<User> for RegisteredEvent {
        fn apply(&self, user: &mut User) {
            user.email = self.email.clone();
        }
    }

    #[derive(Debug, Deserialize)]
    struct ShoutingRegisteredEvent {
        email: String,
    }

    impl EventHandler<User> for ShoutingRegisteredEvent {
        fn apply(&self, user: &mut User) {
            user.email = self.email.to_uppercase();
        }
    }

    fn payload(value: serde_json::Value) -> Payload {
        match value {
            Value::Object(map) => map,
            other => panic!("expected JSON object, got: {other:?}"),
        }
    }

    #[test]
    fn naming_matches_the_documented_shapes() {
        assert_eq!(handler_type_name("User", "registered"), "User.RegisteredEvent");
        assert_eq!(
            handler_type_name("User", "email_changed"),
            "User.EmailChangedEvent"
        );
        assert_eq!(
            handler_type_name("billing.Account.EventStore", "credited"),
            "billing.Account.CreditedEvent"
        );
    }

    #[test]
    fn qualifier_is_stripped_only_from_the_tail() {
        assert_eq!(
            handler_type_name("EventStore.User", "registered"),
            "EventStore.User.RegisteredEvent"
        );
    }

    #[test]
    fn resolving_an_unregistered_name_fails() {
        let registry = HandlerRegistry::<User>::new();

        match registry.resolve("User.RegisteredEvent").map(|_| ()) {
            Err(EventError::HandlerNotFound(name)) => {
                assert_eq!(name, "User.RegisteredEvent");
            }
            other => panic!("expected HandlerNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn registered_factory_builds_a_working_handler() {
        let mut registry = HandlerRegistry::<User>::new();
        registry.register::<RegisteredEvent>("registered");

        let factory = registry.resolve("User.RegisteredEvent").unwrap();
        let handler = factory(&payload(json!({"email": "bob@example.com"}))).unwrap();

        let mut user = User::default();
        handler.apply(&mut user);
        assert_eq!(user.email, "bob@example.com");
    }

    #[test]
    fn mismatched_payload_is_a_deserialize_error() {
        let mut registry = HandlerRegistry::<User>::new();
        registry.register::<RegisteredEvent>("registered");

        let factory = registry.resolve("User.RegisteredEvent").unwrap();
        let result = factory(&payload(json!({"email": 7}))).map(|_| ());

        match result {
            Err(EventError::Deserialize(detail)) => {
                assert!(detail.starts_with("User.RegisteredEvent:"), "{detail}");
            }
            other => panic!("expected Deserialize, got: {other:?}"),
        }
    }

    #[test]
    fn re_registering_an_event_name_replaces_the_handler() {
        let mut registry = HandlerRegistry::<User>::new();
        registry
            .register::<RegisteredEvent>("registered")
            .register::<ShoutingRegisteredEvent>("registered");

        let factory = registry.resolve("User.RegisteredEvent").unwrap();
        let handler = factory(&payload(json!({"email": "bob@example.com"}))).unwrap();

        let mut user = User::default();
        handler.apply(&mut user);
        assert_eq!(user.email, "BOB@EXAMPLE.COM");
    }

    proptest! {
        #[test]
        fn naming_is_deterministic(
            kind in "[A-Za-z]+(\\.[A-Za-z]+){0,2}",
            name in "[a-z]+(_[a-z]+){0,2}",
        ) {
            prop_assert_eq!(
                handler_type_name(&kind, &name),
                handler_type_name(&kind, &name)
            );
        }

        #[test]
        fn qualified_and_bare_kinds_name_the_same_handler(
            base in "[A-Za-z]+",
            name in "[a-z]+",
        ) {
            let qualified = format!("{base}.EventStore");
            prop_assert_eq!(
                handler_type_name(&qualified, &name),
                handler_type_name(&base, &name)
            );
        }
    }
}
