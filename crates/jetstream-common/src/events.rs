//! Stream lifecycle Events
//!
//! Each reconcile attempt narrates itself on the Stream object: `Connecting`
//! and `Connected` around the NATS session, `Creating`/`Created`,
//! `Updating`/`Updated` or `Deleting`/`Deleted` around the JetStream call,
//! and a Warning `Noop` when nothing needed doing. Publishing is best-effort;
//! a failed Event is logged and the reconcile carries on.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    ///
    /// # Arguments
    ///
    /// * `resource_ref` - The Kubernetes object this event is about
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason string (e.g. "Created")
    /// * `action` - What action was taken (e.g. "Reconcile")
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher reporting as `controller_name`.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Publisher that drops every event.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings.
///
/// These appear in `kubectl get events` under the REASON column.
pub mod reasons {
    /// Opening a connection to the NATS servers
    pub const CONNECTING: &str = "Connecting";
    /// Connection established
    pub const CONNECTED: &str = "Connected";
    /// Stream creation started
    pub const CREATING: &str = "Creating";
    /// Stream created
    pub const CREATED: &str = "Created";
    /// Stream configuration update started
    pub const UPDATING: &str = "Updating";
    /// Stream configuration updated
    pub const UPDATED: &str = "Updated";
    /// Stream deletion started
    pub const DELETING: &str = "Deleting";
    /// Stream deleted and finalizer cleared
    pub const DELETED: &str = "Deleted";
    /// Nothing to do for this reconcile
    pub const NOOP: &str = "Noop";
}

/// Well-known event action strings.
///
/// These appear in `kubectl get events` under the ACTION column.
pub mod actions {
    /// Connecting to NATS
    pub const CONNECT: &str = "Connect";
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Creating a stream
    pub const CREATE: &str = "Create";
    /// Updating a stream
    pub const UPDATE: &str = "Update";
    /// Deleting a stream
    pub const DELETE: &str = "Delete";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
    }

    #[test]
    fn reason_constants_are_pascal_case() {
        for reason in [
            reasons::CONNECTING,
            reasons::CONNECTED,
            reasons::CREATING,
            reasons::CREATED,
            reasons::UPDATING,
            reasons::UPDATED,
            reasons::DELETING,
            reasons::DELETED,
            reasons::NOOP,
        ] {
            assert!(reason.chars().next().unwrap().is_ascii_uppercase());
            assert!(!reason.contains(' '));
        }
    }

    #[tokio::test]
    async fn noop_publisher_does_not_panic() {
        let publisher = NoopEventPublisher;
        let obj_ref = ObjectReference::default();
        publisher
            .publish(
                &obj_ref,
                EventType::Warning,
                reasons::NOOP,
                actions::RECONCILE,
                Some("Nothing done for stream \"ORDERS\"".to_string()),
            )
            .await;
    }
}
