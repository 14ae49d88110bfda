//! Stream CRD for declaring NATS JetStream streams
//!
//! A Stream describes a JetStream stream that the controller creates, keeps
//! in sync and deletes on the NATS servers listed in its spec.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Condition type reported for overall stream health
pub const READY_CONDITION: &str = "Ready";

/// Stream declares a JetStream stream.
///
/// Example:
/// ```yaml
/// apiVersion: jetstream.nats.io/v1beta1
/// kind: Stream
/// metadata:
///   name: orders
/// spec:
///   name: ORDERS
///   subjects: ["orders.*"]
///   storage: file
///   maxAge: 24h
///   servers: ["nats://nats:4222"]
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "jetstream.nats.io",
    version = "v1beta1",
    kind = "Stream",
    namespaced,
    status = "StreamStatus",
    printcolumn = r#"{"name":"Stream","type":"string","jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StreamSpec {
    /// Name of the stream on the NATS servers
    pub name: String,

    /// Subjects the stream consumes
    #[serde(default)]
    pub subjects: Vec<String>,

    /// Retention policy: limits, interest or workqueue
    #[serde(default = "default_retention")]
    pub retention: String,

    /// Storage backend: file or memory
    #[serde(default = "default_storage")]
    pub storage: String,

    /// Discard policy when limits are reached: old or new
    #[serde(default = "default_discard")]
    pub discard: String,

    /// Number of stream replicas
    #[serde(default = "default_replicas")]
    pub replicas: i64,

    /// Maximum age of a message, as a duration string (e.g. "24h")
    #[serde(default)]
    pub max_age: String,

    /// Maximum bytes stored; -1 for unlimited
    #[serde(default = "unlimited")]
    pub max_bytes: i64,

    /// Maximum number of messages stored; -1 for unlimited
    #[serde(default = "unlimited")]
    pub max_msgs: i64,

    /// Largest accepted message size in bytes; -1 for unlimited
    #[serde(default = "unlimited")]
    pub max_msg_size: i64,

    /// Maximum number of consumers; -1 for unlimited
    #[serde(default = "unlimited")]
    pub max_consumers: i64,

    /// Window for duplicate message tracking, as a duration string
    #[serde(default)]
    pub duplicate_window: String,

    /// Disable acknowledgement of published messages
    #[serde(default)]
    pub no_ack: bool,

    /// NATS server URLs to connect to
    #[serde(default)]
    pub servers: Vec<String>,

    /// Secret holding a NATS credentials file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret: Option<CredentialsSecretRef>,
}

fn default_retention() -> String {
    "limits".to_string()
}

fn default_storage() -> String {
    "memory".to_string()
}

fn default_discard() -> String {
    "old".to_string()
}

fn default_replicas() -> i64 {
    1
}

fn unlimited() -> i64 {
    -1
}

/// Reference to a key in a Secret in the Stream's namespace
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsSecretRef {
    /// Secret name
    pub name: String,

    /// Key within the secret holding the creds file
    #[serde(default = "default_creds_key")]
    pub key: String,
}

fn default_creds_key() -> String {
    "creds".to_string()
}

/// Stream status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    /// Generation of the spec last applied to the NATS servers
    #[serde(default)]
    pub observed_generation: i64,

    /// Status conditions, at most one per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl StreamStatus {
    /// Look up a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

impl Stream {
    /// Whether deletion has been requested
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Current spec generation (0 when the server has not assigned one)
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or(0)
    }

    /// Generation last recorded in status (0 when there is no status)
    pub fn observed_generation(&self) -> i64 {
        self.status
            .as_ref()
            .map(|s| s.observed_generation)
            .unwrap_or(0)
    }

    /// Whether the spec changed since it was last applied
    pub fn spec_changed(&self) -> bool {
        self.generation() != self.observed_generation()
    }

    /// Whether the given finalizer is present
    pub fn has_finalizer(&self, key: &str) -> bool {
        crate::finalizer::has_finalizer(self.finalizers(), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    use crate::crd::ConditionStatus;

    fn minimal_spec_yaml() -> &'static str {
        r#"
name: ORDERS
"#
    }

    #[test]
    fn test_spec_defaults() {
        let spec: StreamSpec = serde_yaml::from_str(minimal_spec_yaml()).unwrap();

        assert_eq!(spec.name, "ORDERS");
        assert!(spec.subjects.is_empty());
        assert_eq!(spec.retention, "limits");
        assert_eq!(spec.storage, "memory");
        assert_eq!(spec.discard, "old");
        assert_eq!(spec.replicas, 1);
        assert_eq!(spec.max_bytes, -1);
        assert_eq!(spec.max_msgs, -1);
        assert_eq!(spec.max_msg_size, -1);
        assert_eq!(spec.max_consumers, -1);
        assert!(spec.max_age.is_empty());
        assert!(spec.duplicate_window.is_empty());
        assert!(!spec.no_ack);
        assert!(spec.credentials_secret.is_none());
    }

    #[test]
    fn test_spec_camel_case_fields() {
        let yaml = r#"
name: ORDERS
subjects: ["orders.*"]
maxAge: 1h
maxMsgSize: 1024
duplicateWindow: 2m
noAck: true
servers: ["nats://a:4222", "nats://b:4222"]
credentialsSecret:
  name: nats-creds
"#;
        let spec: StreamSpec = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(spec.max_age, "1h");
        assert_eq!(spec.max_msg_size, 1024);
        assert_eq!(spec.duplicate_window, "2m");
        assert!(spec.no_ack);
        assert_eq!(spec.servers.len(), 2);
        let creds = spec.credentials_secret.unwrap();
        assert_eq!(creds.name, "nats-creds");
        assert_eq!(creds.key, "creds");
    }

    #[test]
    fn test_missing_status_counts_as_generation_zero() {
        let mut stream = Stream::new("orders", serde_yaml::from_str(minimal_spec_yaml()).unwrap());
        stream.metadata.generation = Some(1);

        assert_eq!(stream.observed_generation(), 0);
        assert!(stream.spec_changed());

        stream.status = Some(StreamStatus {
            observed_generation: 1,
            conditions: vec![],
        });
        assert!(!stream.spec_changed());
    }

    #[test]
    fn test_ready_condition_lookup() {
        let status = StreamStatus {
            observed_generation: 1,
            conditions: vec![Condition::new(
                READY_CONDITION,
                ConditionStatus::True,
                "Created",
                "ok",
            )],
        };
        assert_eq!(
            status.condition(READY_CONDITION).map(|c| &c.status),
            Some(&ConditionStatus::True)
        );
        assert!(status.condition("Other").is_none());
        assert!(StreamStatus::default().condition(READY_CONDITION).is_none());
    }

    #[test]
    fn test_crd_metadata() {
        let crd = Stream::crd();
        assert_eq!(crd.spec.group, "jetstream.nats.io");
        assert_eq!(crd.spec.names.kind, "Stream");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.versions[0].name, "v1beta1");
    }
}
