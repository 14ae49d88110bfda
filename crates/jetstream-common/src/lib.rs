//! Common types for the JetStream operator: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod conditions;
pub mod crd;
pub mod error;
pub mod events;
pub mod finalizer;
pub mod telemetry;

pub use error::{Error, ResultExt};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager name for server-side apply and status patches
pub const FIELD_MANAGER: &str = "jetstream-controller";

/// Controller name reported on Kubernetes Events
pub const CONTROLLER_NAME: &str = "jetstream-controller";
