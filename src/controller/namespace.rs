//! Namespace lifecycle for test namespaces: idempotent create/delete plus
//! the deferred TTL cleanup task.

use crate::controller::velero::RestoreGateway;
use crate::server::SharedMetrics;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Namespace create/delete seam. Both operations are idempotent: a
/// pre-existing namespace on create and an absent namespace on delete are
/// success.
#[async_trait]
pub trait NamespaceManager: Send + Sync {
    async fn create(&self, name: &str, labels: BTreeMap<String, String>)
        -> Result<(), kube::Error>;
    async fn delete(&self, name: &str) -> Result<(), kube::Error>;
}

/// Labels applied to every test namespace.
pub fn test_namespace_labels(backup_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("lazarus.io/test".to_string(), "true".to_string()),
        ("lazarus.io/backup".to_string(), backup_name.to_string()),
        (
            "lazarus.io/managed-by".to_string(),
            "lazarus-operator".to_string(),
        ),
    ])
}

pub struct KubeNamespaceManager {
    client: Client,
}

impl KubeNamespaceManager {
    pub fn new(client: Client) -> Self {
        KubeNamespaceManager { client }
    }

    fn api(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl NamespaceManager for KubeNamespaceManager {
    async fn create(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
    ) -> Result<(), kube::Error> {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        };

        match self.api().create(&PostParams::default(), &namespace).await {
            Ok(_) => {
                info!(namespace = %name, "Created test namespace");
                Ok(())
            }
            Err(kube::Error::Api(ref ae)) if ae.code == 409 => {
                info!(namespace = %name, "Test namespace already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), kube::Error> {
        match self.api().delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(namespace = %name, "Deleted namespace");
                Ok(())
            }
            Err(kube::Error::Api(ref ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Schedule deletion of the test namespace and its restore after `delay`.
///
/// The task is detached: the run never awaits it, and there is no
/// cancellation path once scheduled. Restore deletion stays best-effort.
pub fn schedule_deferred_cleanup(
    namespaces: Arc<dyn NamespaceManager>,
    gateway: RestoreGateway,
    metrics: Option<SharedMetrics>,
    namespace: String,
    restore_name: String,
    delay: Duration,
) -> tokio::task::JoinHandle<()> {
    info!(
        namespace = %namespace,
        delay_secs = delay.as_secs(),
        "Scheduling deferred cleanup"
    );

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        info!(namespace = %namespace, "Executing scheduled cleanup");

        match namespaces.delete(&namespace).await {
            Ok(()) => {
                if let Some(metrics) = &metrics {
                    metrics.record_cleanup(true);
                }
            }
            Err(e) => {
                warn!(error = %e, namespace = %namespace, "Failed to delete test namespace");
                if let Some(metrics) = &metrics {
                    metrics.record_cleanup(false);
                }
            }
        }

        gateway.delete_restore(&restore_name).await;
    })
}

/// Recording in-memory namespace manager for tests.
#[cfg(test)]
pub struct MockNamespaceManager {
    created: std::sync::Mutex<Vec<String>>,
    deleted: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockNamespaceManager {
    pub fn new() -> Self {
        MockNamespaceManager {
            created: std::sync::Mutex::new(Vec::new()),
            deleted: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[async_trait]
impl NamespaceManager for MockNamespaceManager {
    async fn create(
        &self,
        name: &str,
        _labels: BTreeMap<String, String>,
    ) -> Result<(), kube::Error> {
        self.created.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), kube::Error> {
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}
