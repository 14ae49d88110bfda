//! Custom Resource Definitions for the JetStream operator

mod stream;
mod types;

pub use stream::{CredentialsSecretRef, Stream, StreamSpec, StreamStatus, READY_CONDITION};
pub use types::{Condition, ConditionStatus};
