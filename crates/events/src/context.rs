//! Ambient contextual metadata, scoped to the running task.
//!
//! Callers wrap work in [`with_scope`] (or [`with_scope_sync`]) to make a
//! metadata mapping visible to every event record constructed inside; records
//! snapshot [`current`] at construction time. Scopes nest, the merged view is
//! restored on exit whether the body succeeds, fails, or panics, and
//! concurrent tasks never observe each other's scopes.

use std::future::Future;

use crate::payload::{Payload, shallow_merge};

tokio::task_local! {
    static CONTEXT: Payload;
}

/// The metadata mapping active in the calling task.
///
/// Empty when no scope is active, including outside any runtime.
pub fn current() -> Payload {
    CONTEXT.try_with(Clone::clone).unwrap_or_default()
}

/// Run `fut` with `extra` merged into the ambient metadata.
///
/// The view inside the future is `current()` at entry with `extra` shallow-
/// merged on top (extra keys win); the prior view is back in force once the
/// future completes or is dropped.
pub async fn with_scope<F>(extra: Payload, fut: F) -> F::Output
where
    F: Future,
{
    let mut scoped = current();
    shallow_merge(&mut scoped, &extra);
    CONTEXT.scope(scoped, fut).await
}

/// Synchronous form of [`with_scope`]. Restores the prior view on unwind.
pub fn with_scope_sync<T>(extra: Payload, f: impl FnOnce() -> T) -> T {
    let mut scoped = current();
    shallow_merge(&mut scoped, &extra);
    CONTEXT.sync_scope(scoped, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            other => panic!("expected JSON object, got: {other:?}"),
        }
    }

    #[test]
    fn current_is_empty_without_a_scope() {
        assert!(current().is_empty());
    }

    #[tokio::test]
    async fn nested_scopes_merge_and_inner_keys_win() {
        let outer = payload(json!({"tenant": "acme", "actor": "alice"}));
        let inner = payload(json!({"actor": "bob"}));

        let seen = with_scope(outer, async {
            let merged = with_scope(inner, async { current() }).await;
            (merged, current())
        })
        .await;

        assert_eq!(seen.0, payload(json!({"tenant": "acme", "actor": "bob"})));
        assert_eq!(seen.1, payload(json!({"tenant": "acme", "actor": "alice"})));
        assert!(current().is_empty());
    }

    #[tokio::test]
    async fn failing_body_restores_the_prior_view() {
        let outer = payload(json!({"tenant": "acme"}));

        with_scope(outer.clone(), async {
            let result: Result<(), &str> =
                with_scope(payload(json!({"step": 1})), async { Err("boom") }).await;
            assert_eq!(result, Err("boom"));
            assert_eq!(current(), outer);
        })
        .await;
    }

    #[test]
    fn sync_scope_restores_on_panic() {
        let caught = std::panic::catch_unwind(|| {
            with_scope_sync(payload(json!({"step": 1})), || panic!("boom"))
        });

        assert!(caught.is_err());
        assert!(current().is_empty());
    }

    #[tokio::test]
    async fn concurrent_tasks_keep_separate_views() {
        let a = tokio::spawn(with_scope(payload(json!({"task": "a"})), async {
            tokio::task::yield_now().await;
            current()
        }));
        let b = tokio::spawn(with_scope(payload(json!({"task": "b"})), async {
            tokio::task::yield_now().await;
            current()
        }));

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a, payload(json!({"task": "a"})));
        assert_eq!(b, payload(json!({"task": "b"})));
    }
}
