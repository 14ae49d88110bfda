//! Shared controller context

use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio_util::sync::CancellationToken;

use jetstream_common::events::{EventPublisher, KubeEventPublisher};
use jetstream_common::CONTROLLER_NAME;

use crate::backoff::{BackoffConfig, ErrorBackoff};
use crate::credentials::{CredentialResolver, SecretCredentialResolver};
use crate::nats::{AsyncNatsConnector, NatsClientOptions, NatsConnector};
use crate::store::{KubeStreamStore, StreamStore};

/// Deadline for each finalizer or status write
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared context for the Stream controller
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```text
/// let ctx = Context::builder(client)
///     .nats_options(options)
///     .shutdown(token)
///     .build();
/// ```
pub struct Context {
    /// Stream reads and writes (trait object for testability)
    pub store: Arc<dyn StreamStore>,
    /// Opens JetStream sessions
    pub connector: Arc<dyn NatsConnector>,
    /// Resolves credentials secrets
    pub credentials: Arc<dyn CredentialResolver>,
    /// Kubernetes Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Per-object failure backoff
    pub backoff: ErrorBackoff,
    /// Cancelled when the operator shuts down
    pub shutdown: CancellationToken,
    /// Deadline for each finalizer or status write
    pub write_timeout: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with custom collaborators
    #[cfg(test)]
    pub fn for_testing(
        store: Arc<dyn StreamStore>,
        connector: Arc<dyn NatsConnector>,
        credentials: Arc<dyn CredentialResolver>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            connector,
            credentials,
            events,
            backoff: ErrorBackoff::new(BackoffConfig::default()),
            shutdown: CancellationToken::new(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// The Kubernetes-backed store, credentials resolver and event publisher
/// share the builder's client; NATS sessions use [`NatsClientOptions`].
pub struct ContextBuilder {
    client: Client,
    nats_options: NatsClientOptions,
    shutdown: Option<CancellationToken>,
    write_timeout: Duration,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            nats_options: NatsClientOptions::default(),
            shutdown: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Client options for the NATS connector
    pub fn nats_options(mut self, options: NatsClientOptions) -> Self {
        self.nats_options = options;
        self
    }

    /// Token cancelled on shutdown
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Deadline for each finalizer or status write
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let client = self.client;
        Context {
            store: Arc::new(KubeStreamStore::new(client.clone())),
            connector: Arc::new(AsyncNatsConnector::new(self.nats_options)),
            credentials: Arc::new(SecretCredentialResolver::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME)),
            backoff: ErrorBackoff::new(BackoffConfig::default()),
            shutdown: self.shutdown.unwrap_or_else(CancellationToken::new),
            write_timeout: self.write_timeout,
        }
    }
}
