//! Controller runner - builds the Stream controller future
//!
//! Construction is kept apart from `main` so the caller decides how to drive
//! the returned future alongside signal handling.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::controller::{Config as ControllerConfig, Error as ControllerError};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;

use jetstream_common::crd::Stream;
use jetstream_controller::{error_policy, forget_object, reconcile, Context};

use crate::config::ControllerArgs;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Api scoped to the configured namespace, or cluster-wide
pub fn stream_api(client: Client, namespace: Option<&str>) -> Api<Stream> {
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Build the Stream controller future
///
/// `shutdown` is handed to every reconcile so in-flight remote calls abort
/// once the process is told to stop.
pub fn build_stream_controller(
    client: Client,
    args: &ControllerArgs,
    shutdown: CancellationToken,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(
        Context::builder(client.clone())
            .nats_options(args.nats_options())
            .write_timeout(args.write_timeout)
            .shutdown(shutdown)
            .build(),
    );
    let streams = stream_api(client, args.namespace.as_deref());
    let gone_ctx = ctx.clone();

    match &args.namespace {
        Some(ns) => tracing::info!(namespace = %ns, "- Stream controller (namespaced)"),
        None => tracing::info!("- Stream controller (all namespaces)"),
    }

    Box::pin(
        Controller::new(streams, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .with_config(ControllerConfig::default().concurrency(args.concurrency))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .inspect(move |result| {
                if let Err(ControllerError::ObjectNotFound(obj)) = result {
                    forget_object(&gone_ctx, obj.namespace.as_deref(), &obj.name);
                }
            })
            .for_each(log_reconcile_result("Stream")),
    )
}

/// Cancel `token` on SIGINT or SIGTERM
pub async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, cancelling in-flight reconciles");
    token.cancel();
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
