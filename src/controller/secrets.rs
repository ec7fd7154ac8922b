//! Secret value lookup for health checks that resolve their connection
//! target from a cluster Secret.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;

/// Read one key from a namespaced Secret. Returns None when the secret or
/// the key is absent.
#[async_trait]
pub trait SecretReader: Send + Sync {
    async fn read_key(
        &self,
        name: &str,
        key: &str,
        namespace: &str,
    ) -> Result<Option<String>, kube::Error>;
}

pub struct KubeSecretReader {
    client: Client,
}

impl KubeSecretReader {
    pub fn new(client: Client) -> Self {
        KubeSecretReader { client }
    }
}

#[async_trait]
impl SecretReader for KubeSecretReader {
    async fn read_key(
        &self,
        name: &str,
        key: &str,
        namespace: &str,
    ) -> Result<Option<String>, kube::Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api.get_opt(name).await? else {
            return Ok(None);
        };

        let value = secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok());

        Ok(value)
    }
}

/// In-memory secret store for tests, keyed by (namespace, name, key).
#[cfg(test)]
pub struct MockSecretReader {
    values: std::collections::HashMap<(String, String, String), String>,
}

#[cfg(test)]
impl MockSecretReader {
    pub fn new() -> Self {
        MockSecretReader {
            values: std::collections::HashMap::new(),
        }
    }

    pub fn with_value(mut self, namespace: &str, name: &str, key: &str, value: &str) -> Self {
        self.values.insert(
            (namespace.to_string(), name.to_string(), key.to_string()),
            value.to_string(),
        );
        self
    }
}

#[cfg(test)]
#[async_trait]
impl SecretReader for MockSecretReader {
    async fn read_key(
        &self,
        name: &str,
        key: &str,
        namespace: &str,
    ) -> Result<Option<String>, kube::Error> {
        Ok(self
            .values
            .get(&(namespace.to_string(), name.to_string(), key.to_string()))
            .cloned())
    }
}
