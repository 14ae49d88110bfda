//! Error types for the JetStream operator
//!
//! Every failure is wrapped with the operation it occurred in, so the chain
//! that ends up in logs and in the `Ready` condition reads like
//! `failed to process stream: failed to create stream "orders": remote error: ...`.

use std::time::Duration;

use thiserror::Error;

/// Main error type for JetStream operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// A declared spec field could not be translated
    #[error("validation error for {field}: {message}")]
    Validation {
        /// Spec field path (e.g. "spec.maxAge")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// An object does not exist (remote stream or Kubernetes object)
    #[error("{kind} {name:?} not found")]
    NotFound {
        /// Kind of object that was looked up
        kind: String,
        /// Name that was looked up
        name: String,
    },

    /// Optimistic concurrency clash on a Kubernetes write
    #[error("conflict: {message}")]
    Conflict {
        /// Server-provided description
        message: String,
    },

    /// Any other failure reported by the NATS server or client
    #[error("remote error: {message}")]
    Remote {
        /// Description of what failed
        message: String,
    },

    /// Any other failure talking to the Kubernetes API
    #[error("store error: {message}")]
    Store {
        /// Description of what failed
        message: String,
    },

    /// Credentials secret missing or unreadable
    #[error("credentials error: {message}")]
    Credentials {
        /// Description of what failed
        message: String,
    },

    /// A bounded operation exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that was bounded
        operation: String,
        /// Deadline that was exceeded
        after: Duration,
    },

    /// Shutdown was requested while reconciling
    #[error("reconciliation cancelled")]
    Cancelled,

    /// An error annotated with the operation it occurred in
    #[error("{operation}: {source}")]
    Context {
        /// Operation description (e.g. `failed to create stream "orders"`)
        operation: String,
        /// The wrapped error
        source: Box<Error>,
    },

    /// The reconcile failed and recording the failure in status failed too
    #[error("{source}: {status_error}")]
    StatusNotRecorded {
        /// The original reconcile failure
        source: Box<Error>,
        /// Why the Errored status could not be written
        status_error: Box<Error>,
    },
}

impl Error {
    /// Create a validation error for a spec field
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
        }
    }

    /// Create a remote (NATS) error
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote {
            message: msg.into(),
        }
    }

    /// Create a store (Kubernetes API) error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store {
            message: msg.into(),
        }
    }

    /// Create a credentials error
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials {
            message: msg.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Wrap this error with the operation it occurred in
    pub fn context(self, operation: impl Into<String>) -> Self {
        Self::Context {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// Attach the failure to record an Errored status to this error
    pub fn with_status_error(self, status_error: Error) -> Self {
        Self::StatusNotRecorded {
            source: Box::new(self),
            status_error: Box::new(status_error),
        }
    }

    /// The innermost error, skipping operation annotations
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } | Error::StatusNotRecorded { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    /// Check if the root cause is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound { .. })
    }

    /// Check if the root cause is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self.root(), Error::Conflict { .. })
    }

    /// Check if the root cause is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled)
    }

    /// Check if retrying without a spec change can succeed
    ///
    /// Validation errors need the user to fix the Stream spec. Everything
    /// else is transient from the controller's point of view.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.root(), Error::Validation { .. })
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Error::NotFound {
                kind: "object".to_string(),
                name: ae.message,
            },
            kube::Error::Api(ae) if ae.code == 409 => Error::Conflict {
                message: ae.message,
            },
            other => Error::Store {
                message: other.to_string(),
            },
        }
    }
}

/// Extension for annotating results with the failed operation
pub trait ResultExt<T> {
    /// Wrap the error (if any) with an operation description
    fn context(self, operation: impl Into<String>) -> Result<T, Error>;

    /// Like [`ResultExt::context`] but builds the description lazily
    fn with_context<F>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn context(self, operation: impl Into<String>) -> Result<T, Error> {
        self.map_err(|e| e.context(operation))
    }

    fn with_context<F>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.context(f()))
    }
}
