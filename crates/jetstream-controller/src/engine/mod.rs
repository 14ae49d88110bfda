//! Stream reconciliation engine
//!
//! One call to [`process_stream`] is one attempt to converge a single Stream:
//!
//! 1. Read the Stream; if it is gone there is nothing to do.
//! 2. Resolve credentials and open a JetStream session.
//! 3. Probe the server, [`decide`] what to do, and do it.
//!
//! Any failure after step 1 is recorded as `Ready=False` / `Errored` before
//! the error is returned. Attempts are safe to repeat: create only runs when
//! the stream is absent, delete treats absence as success, and update just
//! pushes the same configuration again.

use std::future::Future;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, warn};

use jetstream_common::conditions::{REASON_CREATED, REASON_UPDATED};
use jetstream_common::crd::{Stream, StreamSpec};
use jetstream_common::events::{actions, reasons};
use jetstream_common::finalizer::{add_finalizer, remove_finalizer, STREAM_FINALIZER};
use jetstream_common::{Error, Result, ResultExt};

use crate::context::Context;
use crate::nats::StreamSession;
use crate::probe::stream_exists;
use crate::translate::translate;

/// What a reconcile attempt does to the remote stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Create the stream and adopt it with a finalizer
    Create,
    /// Push the new spec to the existing stream
    Update,
    /// Delete the stream and release the finalizer
    Delete,
    /// Nothing to do
    Noop,
}

/// Pick the action for the observed state; deletion always wins
pub fn decide(delete_requested: bool, remote_exists: bool, spec_changed: bool) -> ReconcileAction {
    match (delete_requested, remote_exists, spec_changed) {
        (true, _, _) => ReconcileAction::Delete,
        (false, true, true) => ReconcileAction::Update,
        (false, false, true) => ReconcileAction::Create,
        (false, _, false) => ReconcileAction::Noop,
    }
}

/// Reconcile the Stream `namespace/name` once
///
/// Returns `Ok(None)` when the Stream no longer exists, otherwise the action
/// that was carried out.
pub async fn process_stream(
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<Option<ReconcileAction>> {
    let found = guarded(ctx, ctx.store.get(namespace, name))
        .await
        .context("failed to process stream")?;
    let Some(mut stream) = found else {
        debug!(namespace, name, "stream no longer exists");
        return Ok(None);
    };

    match converge(ctx, &mut stream).await {
        Ok(action) => Ok(Some(action)),
        Err(err) => Err(record_failure(ctx, &stream, err)
            .await
            .context("failed to process stream")),
    }
}

async fn converge(ctx: &Context, stream: &mut Stream) -> Result<ReconcileAction> {
    let spec = stream.spec.clone();
    let namespace = stream.namespace().unwrap_or_default();
    let object_ref = stream.object_ref(&());

    let credentials = match &spec.credentials_secret {
        Some(secret) => Some(guarded(ctx, ctx.credentials.resolve(&namespace, secret)).await?),
        None => None,
    };

    normal_event(
        ctx,
        &object_ref,
        reasons::CONNECTING,
        actions::CONNECT,
        "Connecting to NATS Server".to_string(),
    )
    .await;
    let session = guarded(ctx, ctx.connector.connect(&spec.servers, credentials)).await?;
    normal_event(
        ctx,
        &object_ref,
        reasons::CONNECTED,
        actions::CONNECT,
        "Connected to NATS Server".to_string(),
    )
    .await;

    let remote_exists = guarded(ctx, stream_exists(session.as_ref(), &spec.name)).await?;
    let action = decide(stream.is_deleting(), remote_exists, stream.spec_changed());
    debug!(
        stream = %spec.name,
        remote_exists,
        generation = stream.generation(),
        observed_generation = stream.observed_generation(),
        ?action,
        "decided reconcile action"
    );

    match action {
        ReconcileAction::Create => {
            normal_event(
                ctx,
                &object_ref,
                reasons::CREATING,
                actions::CREATE,
                format!("Creating stream {:?}", spec.name),
            )
            .await;
            create_stream(ctx, session.as_ref(), &spec).await?;
            ensure_finalizer(ctx, stream).await?;
            mark_ready(ctx, stream, REASON_CREATED, "Stream successfully created").await?;
            normal_event(
                ctx,
                &object_ref,
                reasons::CREATED,
                actions::CREATE,
                format!("Created stream {:?}", spec.name),
            )
            .await;
        }
        ReconcileAction::Update => {
            normal_event(
                ctx,
                &object_ref,
                reasons::UPDATING,
                actions::UPDATE,
                format!("Updating stream {:?}", spec.name),
            )
            .await;
            update_stream(ctx, session.as_ref(), &spec).await?;
            ensure_finalizer(ctx, stream).await?;
            mark_ready(ctx, stream, REASON_UPDATED, "Stream successfully updated").await?;
            normal_event(
                ctx,
                &object_ref,
                reasons::UPDATED,
                actions::UPDATE,
                format!("Updated stream {:?}", spec.name),
            )
            .await;
        }
        ReconcileAction::Delete => {
            normal_event(
                ctx,
                &object_ref,
                reasons::DELETING,
                actions::DELETE,
                format!("Deleting stream {:?}", spec.name),
            )
            .await;
            delete_stream(ctx, session.as_ref(), &spec.name).await?;
            clear_finalizer(ctx, stream).await?;
            normal_event(
                ctx,
                &object_ref,
                reasons::DELETED,
                actions::DELETE,
                format!("Deleted stream {:?}", spec.name),
            )
            .await;
        }
        ReconcileAction::Noop => {
            ctx.events
                .publish(
                    &object_ref,
                    EventType::Warning,
                    reasons::NOOP,
                    actions::RECONCILE,
                    Some(format!("Nothing done for stream {:?}", spec.name)),
                )
                .await;
        }
    }

    info!(stream = %spec.name, ?action, "stream reconciled");
    Ok(action)
}

async fn create_stream(ctx: &Context, session: &dyn StreamSession, spec: &StreamSpec) -> Result<()> {
    async {
        let config = translate(spec)?;
        guarded(ctx, session.create_stream(&config)).await
    }
    .await
    .with_context(|| format!("failed to create stream {:?}", spec.name))
}

async fn update_stream(ctx: &Context, session: &dyn StreamSession, spec: &StreamSpec) -> Result<()> {
    async {
        let remote = guarded(ctx, session.load_stream(&spec.name)).await?;
        let config = translate(spec)?;
        guarded(ctx, remote.update_configuration(&config)).await
    }
    .await
    .with_context(|| format!("failed to update stream {:?}", spec.name))
}

async fn delete_stream(ctx: &Context, session: &dyn StreamSession, name: &str) -> Result<()> {
    let deleted = async {
        let remote = guarded(ctx, session.load_stream(name)).await?;
        guarded(ctx, remote.delete()).await
    }
    .await;

    match deleted {
        Err(e) if e.is_not_found() => {
            debug!(stream = %name, "stream already absent");
            Ok(())
        }
        other => other.with_context(|| format!("failed to delete stream {name:?}")),
    }
}

async fn ensure_finalizer(ctx: &Context, stream: &mut Stream) -> Result<()> {
    if stream.has_finalizer(STREAM_FINALIZER) {
        return Ok(());
    }
    let mut desired = stream.clone();
    desired.metadata.finalizers = Some(add_finalizer(stream.finalizers(), STREAM_FINALIZER));
    *stream = bounded_write(ctx, "set stream finalizers", ctx.store.update(&desired))
        .await
        .with_context(|| format!("failed to set {:?} stream finalizers", stream.name_any()))?;
    Ok(())
}

async fn clear_finalizer(ctx: &Context, stream: &mut Stream) -> Result<()> {
    if !stream.has_finalizer(STREAM_FINALIZER) {
        return Ok(());
    }
    let mut desired = stream.clone();
    desired.metadata.finalizers = Some(remove_finalizer(stream.finalizers(), STREAM_FINALIZER));
    *stream = bounded_write(ctx, "clear stream finalizers", ctx.store.update(&desired))
        .await
        .with_context(|| format!("failed to clear {:?} stream finalizers", stream.name_any()))?;
    Ok(())
}

async fn mark_ready(ctx: &Context, stream: &mut Stream, reason: &str, message: &str) -> Result<()> {
    let mut desired = stream.clone();
    let status = stream.status.clone().unwrap_or_default();
    desired.status = Some(status.ready(stream.generation(), reason, message));
    *stream = bounded_write(ctx, "set stream status", ctx.store.update_status(&desired))
        .await
        .with_context(|| format!("failed to set stream {:?} status", stream.spec.name))?;
    Ok(())
}

/// Record `err` as `Ready=False` and hand it back
///
/// A failure to write the status is attached to the returned error.
/// Cancellation skips the write so the last recorded status stays intact.
///
/// The write carries the last `resourceVersion` this attempt saw. After a
/// [`Error::Conflict`] that version is already stale, so against a real API
/// server the Errored write conflicts too and only the retry records status.
async fn record_failure(ctx: &Context, stream: &Stream, err: Error) -> Error {
    if err.is_cancelled() {
        return err;
    }
    warn!(stream = %stream.name_any(), error = %err, "stream reconcile failed");

    let mut desired = stream.clone();
    let status = stream.status.clone().unwrap_or_default();
    desired.status = Some(status.errored(err.to_string()));

    match bounded_write(ctx, "set stream errored status", ctx.store.update_status(&desired)).await {
        Ok(_) => err,
        Err(status_err) => {
            err.with_status_error(status_err.context("failed to set stream errored status"))
        }
    }
}

async fn normal_event(
    ctx: &Context,
    object_ref: &ObjectReference,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(object_ref, EventType::Normal, reason, action, Some(note))
        .await;
}

/// Run `fut` unless shutdown is requested first
async fn guarded<T>(ctx: &Context, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = ctx.shutdown.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

/// Like [`guarded`], with the context's write deadline
async fn bounded_write<T>(
    ctx: &Context,
    operation: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    guarded(ctx, async {
        tokio::time::timeout(ctx.write_timeout, fut)
            .await
            .map_err(|_| Error::timeout(operation, ctx.write_timeout))?
    })
    .await
}
