//! CRD installation on startup using server-side apply

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use jetstream_common::crd::Stream;
use jetstream_common::FIELD_MANAGER;

/// Name of the Stream CRD object
pub const STREAM_CRD_NAME: &str = "streams.jetstream.nats.io";

/// Stream CRD rendered as YAML, as printed by `--crd`
pub fn stream_crd_yaml() -> anyhow::Result<String> {
    serde_yaml::to_string(&Stream::crd())
        .map_err(|e| anyhow::anyhow!("failed to serialize {} CRD: {}", STREAM_CRD_NAME, e))
}

/// Install or update the Stream CRD
pub async fn ensure_stream_crd(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing {} CRD...", STREAM_CRD_NAME);
    crds.patch(STREAM_CRD_NAME, &params, &Patch::Apply(&Stream::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", STREAM_CRD_NAME, e))?;
    tracing::info!("{} CRD installed/updated", STREAM_CRD_NAME);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crd_name_matches_generated_crd() {
        let crd = Stream::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some(STREAM_CRD_NAME));
    }

    #[test]
    fn test_crd_yaml() {
        let yaml = stream_crd_yaml().unwrap();
        assert!(yaml.contains("kind: CustomResourceDefinition"));
        assert!(yaml.contains("group: jetstream.nats.io"));
        assert!(yaml.contains("v1beta1"));
    }
}
