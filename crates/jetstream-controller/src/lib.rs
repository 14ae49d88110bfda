//! Stream controller: reconciles `Stream` resources against NATS JetStream
//!
//! The pieces, leaves first:
//!
//! - [`translate`]: spec to JetStream configuration
//! - [`nats`]: JetStream connection traits and the `async-nats` implementation
//! - [`probe`]: does a stream exist remotely
//! - [`credentials`], [`store`]: Kubernetes reads and writes
//! - [`engine`]: one reconcile attempt
//! - [`controller`]: `reconcile` / `error_policy` for `kube::runtime::Controller`

pub mod backoff;
pub mod context;
pub mod controller;
pub mod credentials;
pub mod engine;
pub mod nats;
pub mod probe;
pub mod store;
pub mod translate;

pub use context::{Context, ContextBuilder};
pub use controller::{error_policy, forget_object, reconcile};
pub use engine::{decide, process_stream, ReconcileAction};
