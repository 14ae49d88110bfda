//! NATS JetStream adapter
//!
//! The engine talks to JetStream through three small traits so that tests can
//! run against an in-memory server. A [`StreamSession`] lives for a single
//! reconcile and closes its connection when dropped.

use std::path::PathBuf;

use async_nats::jetstream::{self, stream};
use async_nats::{ConnectOptions, ServerAddr};
use async_trait::async_trait;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use jetstream_common::{Error, Result};

use crate::translate::{DiscardPolicy, RetentionPolicy, StorageType, StreamConfig};

/// Opens short-lived JetStream sessions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NatsConnector: Send + Sync {
    /// Connect to the given servers
    ///
    /// # Arguments
    ///
    /// * `servers` - NATS server URLs, tried as a cluster
    /// * `credentials` - Contents of a NATS creds file, if any
    async fn connect(
        &self,
        servers: &[String],
        credentials: Option<String>,
    ) -> Result<Box<dyn StreamSession>>;
}

/// An open JetStream connection
#[async_trait]
pub trait StreamSession: Send + Sync {
    /// Look up a stream by name; an absent stream is [`Error::NotFound`]
    async fn load_stream(&self, name: &str) -> Result<Box<dyn RemoteStream>>;

    /// Create a stream
    async fn create_stream(&self, config: &StreamConfig) -> Result<()>;
}

/// Handle to a stream that exists on the server
#[async_trait]
pub trait RemoteStream: Send + Sync {
    /// Replace the stream's configuration
    async fn update_configuration(&self, config: &StreamConfig) -> Result<()>;

    /// Delete the stream
    async fn delete(&self) -> Result<()>;
}

/// Client options shared by every connection
#[derive(Clone, Debug, Default)]
pub struct NatsClientOptions {
    /// Connection name reported to the server
    pub name: Option<String>,
    /// CA bundle used to verify servers
    pub tls_ca: Option<PathBuf>,
    /// Client certificate for mutual TLS
    pub tls_cert: Option<PathBuf>,
    /// Key for `tls_cert`
    pub tls_key: Option<PathBuf>,
}

impl NatsClientOptions {
    fn connect_options(&self, credentials: Option<&str>) -> Result<ConnectOptions> {
        let mut opts = match credentials {
            Some(creds) => ConnectOptions::with_credentials(creds)
                .map_err(|e| Error::credentials(format!("invalid creds file: {e}")))?,
            None => ConnectOptions::new(),
        };

        if let Some(name) = &self.name {
            opts = opts.name(name);
        }
        if let Some(ca) = &self.tls_ca {
            opts = opts.add_root_certificates(ca.clone()).require_tls(true);
        }
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => {
                opts = opts
                    .add_client_certificate(cert.clone(), key.clone())
                    .require_tls(true);
            }
            (None, None) => {}
            _ => {
                return Err(Error::validation(
                    "tls",
                    "client certificate and key must be set together",
                ))
            }
        }
        Ok(opts)
    }
}

/// Production connector backed by `async-nats`
pub struct AsyncNatsConnector {
    options: NatsClientOptions,
}

impl AsyncNatsConnector {
    /// Create a connector using the given client options
    pub fn new(options: NatsClientOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl NatsConnector for AsyncNatsConnector {
    async fn connect(
        &self,
        servers: &[String],
        credentials: Option<String>,
    ) -> Result<Box<dyn StreamSession>> {
        if servers.is_empty() {
            return Err(Error::validation(
                "spec.servers",
                "at least one server URL is required",
            ));
        }
        let addrs = servers
            .iter()
            .map(|s| {
                s.parse::<ServerAddr>()
                    .map_err(|e| Error::validation("spec.servers", format!("{s:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let client = self
            .options
            .connect_options(credentials.as_deref())?
            .connect(addrs.as_slice())
            .await
            .map_err(|e| Error::remote(format!("failed to connect to {}: {e}", servers.join(","))))?;

        debug!(servers = %servers.join(","), "connected to NATS");
        Ok(Box::new(JetStreamSession {
            context: jetstream::new(client),
        }))
    }
}

// The client lives inside the context; the connection closes once the
// session and every handle loaded from it are dropped.
struct JetStreamSession {
    context: jetstream::Context,
}

#[async_trait]
impl StreamSession for JetStreamSession {
    async fn load_stream(&self, name: &str) -> Result<Box<dyn RemoteStream>> {
        match self.context.get_stream(name).await {
            Ok(_) => Ok(Box::new(JetStreamHandle {
                context: self.context.clone(),
                name: name.to_string(),
            })),
            Err(e) if is_stream_not_found(&e) => Err(Error::not_found("stream", name)),
            Err(e) => Err(Error::remote(e.to_string())),
        }
    }

    async fn create_stream(&self, config: &StreamConfig) -> Result<()> {
        self.context
            .create_stream(to_nats_config(config))
            .await
            .map_err(|e| Error::remote(e.to_string()))?;
        Ok(())
    }
}

struct JetStreamHandle {
    context: jetstream::Context,
    name: String,
}

#[async_trait]
impl RemoteStream for JetStreamHandle {
    async fn update_configuration(&self, config: &StreamConfig) -> Result<()> {
        self.context
            .update_stream(to_nats_config(config))
            .await
            .map_err(|e| Error::remote(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        match self.context.delete_stream(&self.name).await {
            Ok(_) => Ok(()),
            Err(e) if is_delete_stream_not_found(&e) => {
                Err(Error::not_found("stream", &self.name))
            }
            Err(e) => Err(Error::remote(e.to_string())),
        }
    }
}

fn is_stream_not_found(err: &jetstream::context::GetStreamError) -> bool {
    matches!(
        err.kind(),
        jetstream::context::GetStreamErrorKind::JetStream(ref e)
            if e.error_code() == jetstream::ErrorCode::STREAM_NOT_FOUND
    )
}

// Deleted by someone else between load and delete
fn is_delete_stream_not_found(err: &jetstream::context::DeleteStreamError) -> bool {
    matches!(
        err.kind(),
        jetstream::context::DeleteStreamErrorKind::JetStream(ref e)
            if e.error_code() == jetstream::ErrorCode::STREAM_NOT_FOUND
    )
}

fn to_nats_config(config: &StreamConfig) -> stream::Config {
    stream::Config {
        name: config.name.clone(),
        subjects: config.subjects.clone(),
        retention: match config.retention {
            RetentionPolicy::Limits => stream::RetentionPolicy::Limits,
            RetentionPolicy::Interest => stream::RetentionPolicy::Interest,
            RetentionPolicy::WorkQueue => stream::RetentionPolicy::WorkQueue,
        },
        storage: match config.storage {
            StorageType::File => stream::StorageType::File,
            StorageType::Memory => stream::StorageType::Memory,
        },
        discard: match config.discard {
            DiscardPolicy::Old => stream::DiscardPolicy::Old,
            DiscardPolicy::New => stream::DiscardPolicy::New,
        },
        num_replicas: config.replicas,
        max_age: config.max_age,
        max_bytes: config.max_bytes,
        max_messages: config.max_msgs,
        max_message_size: config.max_msg_size,
        max_consumers: config.max_consumers,
        duplicate_window: config.duplicate_window,
        no_ack: config.no_ack,
        ..Default::default()
    }
}

/// In-memory JetStream used by the engine and driver tests
#[cfg(test)]
pub(crate) mod fake {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct State {
        streams: BTreeMap<String, StreamConfig>,
        fail_create: Option<String>,
        fail_connect: Option<String>,
        fail_update: Option<String>,
        fail_delete: Option<String>,
        vanish_after_load: bool,
        connects: usize,
        creates: usize,
        updates: usize,
        deletes: usize,
        last_credentials: Option<String>,
    }

    /// Shared fake server; clones observe the same state
    #[derive(Clone, Default)]
    pub(crate) struct FakeNats {
        state: Arc<Mutex<State>>,
        open_sessions: Arc<AtomicUsize>,
    }

    impl FakeNats {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_stream(self, config: StreamConfig) -> Self {
            self.lock().streams.insert(config.name.clone(), config);
            self
        }

        pub(crate) fn fail_create_once(&self, message: &str) {
            self.lock().fail_create = Some(message.to_string());
        }

        pub(crate) fn fail_connect_once(&self, message: &str) {
            self.lock().fail_connect = Some(message.to_string());
        }

        pub(crate) fn fail_update_once(&self, message: &str) {
            self.lock().fail_update = Some(message.to_string());
        }

        pub(crate) fn fail_delete_once(&self, message: &str) {
            self.lock().fail_delete = Some(message.to_string());
        }

        /// The next loaded stream is removed before its handle is used
        pub(crate) fn vanish_after_next_load(&self) {
            self.lock().vanish_after_load = true;
        }

        pub(crate) fn stream(&self, name: &str) -> Option<StreamConfig> {
            self.lock().streams.get(name).cloned()
        }

        pub(crate) fn connects(&self) -> usize {
            self.lock().connects
        }

        pub(crate) fn creates(&self) -> usize {
            self.lock().creates
        }

        pub(crate) fn updates(&self) -> usize {
            self.lock().updates
        }

        pub(crate) fn deletes(&self) -> usize {
            self.lock().deletes
        }

        pub(crate) fn last_credentials(&self) -> Option<String> {
            self.lock().last_credentials.clone()
        }

        /// Sessions connected but not yet dropped
        pub(crate) fn open_sessions(&self) -> usize {
            self.open_sessions.load(Ordering::SeqCst)
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, State> {
            self.state.lock().expect("fake nats mutex poisoned")
        }
    }

    #[async_trait]
    impl NatsConnector for FakeNats {
        async fn connect(
            &self,
            _servers: &[String],
            credentials: Option<String>,
        ) -> Result<Box<dyn StreamSession>> {
            {
                let mut state = self.lock();
                if let Some(msg) = state.fail_connect.take() {
                    return Err(Error::remote(msg));
                }
                state.connects += 1;
                state.last_credentials = credentials;
            }
            self.open_sessions.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession { nats: self.clone() }))
        }
    }

    struct FakeSession {
        nats: FakeNats,
    }

    impl Drop for FakeSession {
        fn drop(&mut self) {
            self.nats.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl StreamSession for FakeSession {
        async fn load_stream(&self, name: &str) -> Result<Box<dyn RemoteStream>> {
            let mut state = self.nats.lock();
            if state.streams.contains_key(name) {
                if std::mem::take(&mut state.vanish_after_load) {
                    state.streams.remove(name);
                }
                Ok(Box::new(FakeStream {
                    nats: self.nats.clone(),
                    name: name.to_string(),
                }))
            } else {
                Err(Error::not_found("stream", name))
            }
        }

        async fn create_stream(&self, config: &StreamConfig) -> Result<()> {
            let mut state = self.nats.lock();
            if let Some(msg) = state.fail_create.take() {
                return Err(Error::remote(msg));
            }
            if state.streams.contains_key(&config.name) {
                return Err(Error::remote("stream name already in use"));
            }
            state.creates += 1;
            state.streams.insert(config.name.clone(), config.clone());
            Ok(())
        }
    }

    struct FakeStream {
        nats: FakeNats,
        name: String,
    }

    #[async_trait]
    impl RemoteStream for FakeStream {
        async fn update_configuration(&self, config: &StreamConfig) -> Result<()> {
            let mut state = self.nats.lock();
            if let Some(msg) = state.fail_update.take() {
                return Err(Error::remote(msg));
            }
            state.updates += 1;
            state.streams.insert(self.name.clone(), config.clone());
            Ok(())
        }

        async fn delete(&self) -> Result<()> {
            let mut state = self.nats.lock();
            if let Some(msg) = state.fail_delete.take() {
                return Err(Error::remote(msg));
            }
            if state.streams.remove(&self.name).is_none() {
                return Err(Error::not_found("stream", &self.name));
            }
            state.deletes += 1;
            Ok(())
        }
    }
}
