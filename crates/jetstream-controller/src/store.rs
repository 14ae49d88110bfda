//! Stream resource store
//!
//! Writes carry the `resourceVersion` the controller last read, so a
//! concurrent change on the API server surfaces as [`Error::Conflict`]
//! and the whole reconcile is retried.

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;

#[cfg(test)]
use mockall::automock;

use jetstream_common::crd::Stream;
use jetstream_common::{Error, Result, FIELD_MANAGER};

/// Trait abstracting reads and writes of Stream resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Get a Stream, or `None` if it no longer exists
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Stream>>;

    /// Persist `stream.metadata.finalizers`
    async fn update(&self, stream: &Stream) -> Result<Stream>;

    /// Persist `stream.status`
    async fn update_status(&self, stream: &Stream) -> Result<Stream>;
}

/// Kubernetes-backed store
pub struct KubeStreamStore {
    client: Client,
}

impl KubeStreamStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, stream: &Stream) -> Result<Api<Stream>> {
        let namespace = stream
            .namespace()
            .ok_or_else(|| Error::store(format!("stream {} has no namespace", stream.name_any())))?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }
}

#[async_trait]
impl StreamStore for KubeStreamStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Stream>> {
        let api: Api<Stream> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(stream) => Ok(Some(stream)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, stream: &Stream) -> Result<Stream> {
        let patch = finalizers_patch(stream);
        let updated = self
            .api(stream)?
            .patch(
                &stream.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(updated)
    }

    async fn update_status(&self, stream: &Stream) -> Result<Stream> {
        let patch = status_patch(stream);
        let updated = self
            .api(stream)?
            .patch_status(
                &stream.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(updated)
    }
}

fn finalizers_patch(stream: &Stream) -> serde_json::Value {
    json!({
        "metadata": {
            "resourceVersion": stream.resource_version(),
            "finalizers": stream.finalizers(),
        }
    })
}

fn status_patch(stream: &Stream) -> serde_json::Value {
    json!({
        "metadata": {
            "resourceVersion": stream.resource_version(),
        },
        "status": stream.status,
    })
}
