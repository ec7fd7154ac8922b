//! Restore Gateway: verifies backups, submits restores, polls them to a
//! terminal state and parses their progress statistics.
//!
//! Access to the Velero API goes through the `VeleroApi` trait so the
//! wait/poll state machine can be driven by a scripted mock in tests.

use crate::controller::error::TestFailure;
use crate::crd::restore_test::RestoreFilters;
use crate::crd::velero::{
    Backup, Restore, RestoreSpec, RestoreStatusSpec, BACKUP_PHASE_COMPLETED,
    RESTORE_PHASE_COMPLETED,
};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Thin async seam over the Velero custom resources.
#[async_trait]
pub trait VeleroApi: Send + Sync {
    async fn get_backup(&self, name: &str) -> Result<Option<Backup>, kube::Error>;
    async fn create_restore(&self, restore: &Restore) -> Result<Restore, kube::Error>;
    async fn get_restore(&self, name: &str) -> Result<Option<Restore>, kube::Error>;
    async fn delete_restore(&self, name: &str) -> Result<(), kube::Error>;
}

/// Production implementation backed by the cluster.
pub struct KubeVeleroApi {
    client: Client,
    namespace: String,
}

impl KubeVeleroApi {
    /// `namespace` is where Velero is installed; Backup and Restore
    /// resources live there.
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        KubeVeleroApi {
            client,
            namespace: namespace.into(),
        }
    }

    fn backups(&self) -> Api<Backup> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn restores(&self) -> Api<Restore> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

#[async_trait]
impl VeleroApi for KubeVeleroApi {
    async fn get_backup(&self, name: &str) -> Result<Option<Backup>, kube::Error> {
        self.backups().get_opt(name).await
    }

    async fn create_restore(&self, restore: &Restore) -> Result<Restore, kube::Error> {
        self.restores()
            .create(&PostParams::default(), restore)
            .await
    }

    async fn get_restore(&self, name: &str) -> Result<Option<Restore>, kube::Error> {
        self.restores().get_opt(name).await
    }

    async fn delete_restore(&self, name: &str) -> Result<(), kube::Error> {
        self.restores()
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
    }
}

/// Restore progress statistics. Missing fields default to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub items_attempted: i64,
    pub items_restored: i64,
    pub errors: usize,
    pub warnings: usize,
}

/// Gateway through which the orchestrator drives the restore subsystem.
#[derive(Clone)]
pub struct RestoreGateway {
    api: Arc<dyn VeleroApi>,
}

impl RestoreGateway {
    pub fn new(api: Arc<dyn VeleroApi>) -> Self {
        RestoreGateway { api }
    }

    /// Verify the backup exists and is Completed.
    ///
    /// Any other state is a permanent precondition failure: retrying the run
    /// cannot change the backup's phase.
    pub async fn verify_backup(&self, name: &str) -> Result<Backup, TestFailure> {
        let backup = self
            .api
            .get_backup(name)
            .await?
            .ok_or_else(|| TestFailure::PreconditionFailed(format!("backup {name} not found")))?;

        let phase = backup
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("Unknown");

        if phase != BACKUP_PHASE_COMPLETED {
            return Err(TestFailure::PreconditionFailed(format!(
                "backup {name} is not completed (phase: {phase})"
            )));
        }

        info!(backup = %name, "Backup verified");
        Ok(backup)
    }

    /// Submit a restore of `backup_name` rewritten into `target_namespace`.
    ///
    /// Every non-wildcard included namespace is mapped to the single target
    /// namespace. When more than one explicit namespace is included their
    /// workloads end up merged into one namespace.
    pub async fn submit_restore(
        &self,
        restore_name: &str,
        backup_name: &str,
        target_namespace: &str,
        filters: &RestoreFilters,
    ) -> Result<Restore, TestFailure> {
        let explicit: Vec<&String> = filters
            .included_namespaces
            .iter()
            .filter(|ns| ns.as_str() != "*")
            .collect();
        if explicit.len() > 1 {
            warn!(
                restore = %restore_name,
                sources = explicit.len(),
                target = %target_namespace,
                "Multiple source namespaces collapse into one test namespace"
            );
        }

        let namespace_mapping: BTreeMap<String, String> = explicit
            .into_iter()
            .map(|ns| (ns.clone(), target_namespace.to_string()))
            .collect();

        let restore = Restore {
            metadata: ObjectMeta {
                name: Some(restore_name.to_string()),
                labels: Some(BTreeMap::from([
                    ("lazarus.io/test".to_string(), "true".to_string()),
                    ("lazarus.io/backup".to_string(), backup_name.to_string()),
                ])),
                ..Default::default()
            },
            spec: RestoreSpec {
                backup_name: backup_name.to_string(),
                included_namespaces: filters.included_namespaces.clone(),
                excluded_namespaces: filters.excluded_namespaces.clone(),
                included_resources: filters.included_resources.clone(),
                excluded_resources: filters.excluded_resources.clone(),
                restore_pvs: true,
                include_cluster_resources: false,
                namespace_mapping,
                restore_status: filters.restore_status.then(|| RestoreStatusSpec {
                    included_resources: vec!["*".to_string()],
                }),
            },
            status: None,
        };

        let created = self.api.create_restore(&restore).await?;
        info!(restore = %restore_name, backup = %backup_name, "Created restore");
        Ok(created)
    }

    /// Poll the restore until it reaches a terminal phase.
    ///
    /// The deadline is checked against wall clock from loop entry before
    /// every fetch, so slow fetches count against the budget. A restore that
    /// vanishes mid-wait is a runtime failure, not a precondition failure.
    pub async fn await_completion(
        &self,
        name: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Restore, TestFailure> {
        let started = tokio::time::Instant::now();
        info!(restore = %name, timeout_secs = timeout.as_secs(), "Waiting for restore to complete");

        loop {
            if started.elapsed() >= timeout {
                return Err(TestFailure::RestoreTimeout {
                    name: name.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }

            let restore = self
                .api
                .get_restore(name)
                .await?
                .ok_or_else(|| TestFailure::RestoreVanished(name.to_string()))?;

            let phase = restore.phase().to_string();
            debug!(restore = %name, phase = %phase, "Restore status");

            if phase == RESTORE_PHASE_COMPLETED {
                info!(restore = %name, "Restore completed");
                return Ok(restore);
            }

            if restore.is_terminal_failure() {
                let stats = Self::parse_stats(&restore);
                return Err(TestFailure::RestoreFailed {
                    name: name.to_string(),
                    phase,
                    errors: stats.errors,
                    warnings: stats.warnings,
                });
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Parse progress statistics from a restore. Missing fields default to
    /// zero.
    pub fn parse_stats(restore: &Restore) -> RestoreStats {
        let status = restore.status.as_ref();
        let progress = status.and_then(|s| s.progress.as_ref());

        RestoreStats {
            items_attempted: progress.and_then(|p| p.total_items).unwrap_or(0),
            items_restored: progress.and_then(|p| p.items_restored).unwrap_or(0),
            errors: status.map(|s| s.errors.len()).unwrap_or(0),
            warnings: status.map(|s| s.warnings.len()).unwrap_or(0),
        }
    }

    /// Best-effort restore deletion: absence is success, other failures are
    /// logged and swallowed.
    pub async fn delete_restore(&self, name: &str) {
        match self.api.delete_restore(name).await {
            Ok(()) => info!(restore = %name, "Deleted restore"),
            Err(kube::Error::Api(ref ae)) if ae.code == 404 => {
                debug!(restore = %name, "Restore already gone");
            }
            Err(e) => {
                warn!(error = %e, restore = %name, "Failed to delete restore (best-effort)");
            }
        }
    }
}

/// Scripted in-memory Velero API for tests.
#[cfg(test)]
pub struct MockVeleroApi {
    backups: std::sync::Mutex<std::collections::HashMap<String, Backup>>,
    /// Successive `get_restore` responses; the last entry is sticky.
    restore_script: std::sync::Mutex<std::collections::VecDeque<Restore>>,
    created: std::sync::Mutex<Vec<Restore>>,
    deleted: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockVeleroApi {
    pub fn new() -> Self {
        MockVeleroApi {
            backups: std::sync::Mutex::new(std::collections::HashMap::new()),
            restore_script: std::sync::Mutex::new(std::collections::VecDeque::new()),
            created: std::sync::Mutex::new(Vec::new()),
            deleted: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_backup(self, name: &str, phase: &str) -> Self {
        self.backups.lock().unwrap().insert(
            name.to_string(),
            Backup {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                spec: Default::default(),
                status: Some(crate::crd::velero::BackupStatus {
                    phase: Some(phase.to_string()),
                    completion_timestamp: None,
                }),
            },
        );
        self
    }

    /// Queue a restore state to return from successive polls.
    pub fn script_restore(&self, restore: Restore) {
        self.restore_script.lock().unwrap().push_back(restore);
    }

    pub fn created_restores(&self) -> Vec<Restore> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted_restores(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[async_trait]
impl VeleroApi for MockVeleroApi {
    async fn get_backup(&self, name: &str) -> Result<Option<Backup>, kube::Error> {
        Ok(self.backups.lock().unwrap().get(name).cloned())
    }

    async fn create_restore(&self, restore: &Restore) -> Result<Restore, kube::Error> {
        self.created.lock().unwrap().push(restore.clone());
        Ok(restore.clone())
    }

    async fn get_restore(&self, _name: &str) -> Result<Option<Restore>, kube::Error> {
        let mut script = self.restore_script.lock().unwrap();
        if script.len() > 1 {
            Ok(script.pop_front())
        } else {
            Ok(script.front().cloned())
        }
    }

    async fn delete_restore(&self, name: &str) -> Result<(), kube::Error> {
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// Build a restore in a given phase for scripting mocks.
#[cfg(test)]
pub fn restore_in_phase(name: &str, phase: &str) -> Restore {
    Restore {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Default::default(),
        status: Some(crate::crd::velero::RestoreStatus {
            phase: Some(phase.to_string()),
            progress: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }),
    }
}
