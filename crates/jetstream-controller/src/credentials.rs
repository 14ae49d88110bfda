//! NATS credentials lookup

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;

#[cfg(test)]
use mockall::automock;

use jetstream_common::crd::CredentialsSecretRef;
use jetstream_common::{Error, Result};

/// Resolves a credentials reference to the contents of a NATS creds file
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Read the referenced secret key in `namespace`
    async fn resolve(&self, namespace: &str, secret: &CredentialsSecretRef) -> Result<String>;
}

/// Reads creds files from Kubernetes Secrets
pub struct SecretCredentialResolver {
    client: Client,
}

impl SecretCredentialResolver {
    /// Create a resolver using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialResolver for SecretCredentialResolver {
    async fn resolve(&self, namespace: &str, secret: &CredentialsSecretRef) -> Result<String> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let found = api.get_opt(&secret.name).await.map_err(|e| {
            Error::credentials(format!(
                "failed to read secret {}/{}: {e}",
                namespace, secret.name
            ))
        })?;
        let found = found.ok_or_else(|| {
            Error::credentials(format!("secret {}/{} not found", namespace, secret.name))
        })?;
        creds_from_secret(&found, namespace, secret)
    }
}

fn creds_from_secret(
    found: &Secret,
    namespace: &str,
    secret: &CredentialsSecretRef,
) -> Result<String> {
    let bytes = found
        .data
        .as_ref()
        .and_then(|d| d.get(&secret.key))
        .map(|b| b.0.clone())
        .or_else(|| {
            found
                .string_data
                .as_ref()
                .and_then(|d| d.get(&secret.key))
                .map(|s| s.clone().into_bytes())
        })
        .ok_or_else(|| {
            Error::credentials(format!(
                "secret {}/{} has no key {:?}",
                namespace, secret.name, secret.key
            ))
        })?;

    String::from_utf8(bytes).map_err(|_| {
        Error::credentials(format!(
            "secret {}/{} key {:?} is not valid UTF-8",
            namespace, secret.name, secret.key
        ))
    })
}
