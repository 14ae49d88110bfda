//! Queue driver for the Stream controller
//!
//! `kube::runtime::Controller` hands us one object at a time and never runs
//! two reconciles for the same object concurrently. A success forgets the
//! object's failure history; a failure is requeued with per-object
//! exponential backoff.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{error, info, instrument};

use jetstream_common::crd::Stream;
use jetstream_common::Error;

use crate::context::Context;
use crate::engine::process_stream;

/// Key identifying a Stream in the backoff table
pub fn object_key(stream: &Stream) -> String {
    backoff_key(stream.namespace().as_deref(), &stream.name_any())
}

fn backoff_key(namespace: Option<&str>, name: &str) -> String {
    format!("{}/{}", namespace.unwrap_or_default(), name)
}

/// Drop the failure history of a Stream that is no longer in the cache
///
/// The controller stops calling [`reconcile`] for objects that are gone, so
/// a Stream removed while still failing would otherwise keep its entry.
pub fn forget_object(ctx: &Context, namespace: Option<&str>, name: &str) {
    ctx.backoff.forget(&backoff_key(namespace, name));
}

/// Reconcile a Stream resource
///
/// Called by the controller for every change to a Stream. The engine re-reads
/// the object itself, so a stale cache entry is harmless.
#[instrument(
    skip(stream, ctx),
    fields(stream = %stream.name_any(), namespace = %stream.namespace().unwrap_or_default())
)]
pub async fn reconcile(stream: Arc<Stream>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = stream.namespace().unwrap_or_default();
    let name = stream.name_any();

    let outcome = process_stream(&ctx, &namespace, &name).await?;
    ctx.backoff.forget(&object_key(&stream));

    info!(action = ?outcome, "reconciliation completed");
    Ok(Action::await_change())
}

/// Error policy for the Stream controller
///
/// Requeues with a delay that doubles for each consecutive failure of the
/// same Stream.
pub fn error_policy(stream: Arc<Stream>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = object_key(&stream);
    let delay = ctx.backoff.next_delay(&key);
    error!(
        ?error,
        stream = %key,
        retryable = error.is_retryable(),
        retry_in_ms = delay.as_millis() as u64,
        "reconciliation failed"
    );
    Action::requeue(delay)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use jetstream_common::crd::StreamSpec;
    use jetstream_common::events::NoopEventPublisher;

    use super::*;
    use crate::credentials::MockCredentialResolver;
    use crate::nats::fake::FakeNats;
    use crate::store::MockStreamStore;

    fn sample_stream() -> Stream {
        let spec: StreamSpec = serde_json::from_value(json!({
            "name": "ORDERS",
            "servers": ["nats://nats:4222"],
        }))
        .unwrap();
        let mut stream = Stream::new("orders", spec);
        stream.metadata.namespace = Some("default".to_string());
        stream.metadata.generation = Some(1);
        stream.metadata.resource_version = Some("1".to_string());
        stream
    }

    fn context(store: MockStreamStore, nats: FakeNats) -> Arc<Context> {
        Arc::new(Context::for_testing(
            Arc::new(store),
            Arc::new(nats),
            Arc::new(MockCredentialResolver::new()),
            Arc::new(NoopEventPublisher),
        ))
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key(&sample_stream()), "default/orders");
    }

    /// Story: Repeated failures back off, success resets the schedule
    #[tokio::test]
    async fn story_backoff_grows_then_resets_on_success() {
        let nats = FakeNats::new();
        let mut store = MockStreamStore::new();
        store
            .expect_get()
            .returning(|_, _| Ok(Some(sample_stream())));
        store.expect_update().returning(|s| Ok(s.clone()));
        store.expect_update_status().returning(|s| Ok(s.clone()));
        let ctx = context(store, nats.clone());
        let stream = Arc::new(sample_stream());
        let err = Error::remote("connection refused");

        let first = error_policy(stream.clone(), &err, ctx.clone());
        let second = error_policy(stream.clone(), &err, ctx.clone());
        assert_eq!(first, Action::requeue(Duration::from_millis(5)));
        assert_eq!(second, Action::requeue(Duration::from_millis(10)));
        assert_eq!(ctx.backoff.failures("default/orders"), 2);

        let action = reconcile(stream.clone(), ctx.clone()).await.unwrap();
        assert_eq!(action, Action::await_change());
        assert_eq!(ctx.backoff.failures("default/orders"), 0);
        assert_eq!(nats.creates(), 1);

        let after_reset = error_policy(stream, &err, ctx);
        assert_eq!(after_reset, Action::requeue(Duration::from_millis(5)));
    }

    #[test]
    fn test_forget_object_drops_failure_history() {
        let ctx = context(MockStreamStore::new(), FakeNats::new());
        let stream = Arc::new(sample_stream());
        let err = Error::remote("connection refused");
        error_policy(stream.clone(), &err, ctx.clone());
        error_policy(stream, &err, ctx.clone());

        forget_object(&ctx, Some("other"), "orders");
        assert_eq!(ctx.backoff.failures("default/orders"), 2);

        forget_object(&ctx, Some("default"), "orders");
        assert_eq!(ctx.backoff.failures("default/orders"), 0);
    }

    #[tokio::test]
    async fn test_reconcile_failure_surfaces_error() {
        let nats = FakeNats::new();
        nats.fail_connect_once("connection refused");
        let mut store = MockStreamStore::new();
        store
            .expect_get()
            .returning(|_, _| Ok(Some(sample_stream())));
        store
            .expect_update_status()
            .times(1)
            .returning(|s| Ok(s.clone()));
        let ctx = context(store, nats);

        let err = reconcile(Arc::new(sample_stream()), ctx).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
