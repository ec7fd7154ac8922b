//! Typed partial views of the external Velero resources this operator reads
//! and drives. Only the fields the restore-test engine touches are modeled;
//! everything else on the wire is ignored on deserialization.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Backup phase required before a restore test may start.
pub const BACKUP_PHASE_COMPLETED: &str = "Completed";

/// Terminal restore phases.
pub const RESTORE_PHASE_COMPLETED: &str = "Completed";
pub const RESTORE_PHASE_FAILED: &str = "Failed";
pub const RESTORE_PHASE_PARTIALLY_FAILED: &str = "PartiallyFailed";

/// Velero Backup, read-only from this operator's point of view.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "velero.io",
    version = "v1",
    kind = "Backup",
    namespaced,
    status = "BackupStatus"
)]
pub struct BackupSpec {
    /// Namespaces captured by the backup.
    #[serde(rename = "includedNamespaces", default)]
    pub included_namespaces: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct BackupStatus {
    /// New, InProgress, Completed, Failed, PartiallyFailed, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// RFC3339 timestamp of backup completion. Input to RPO estimation.
    #[serde(rename = "completionTimestamp", skip_serializing_if = "Option::is_none")]
    pub completion_timestamp: Option<String>,
}

/// Velero Restore, created and polled for one test run.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "velero.io",
    version = "v1",
    kind = "Restore",
    namespaced,
    status = "RestoreStatus"
)]
pub struct RestoreSpec {
    #[serde(rename = "backupName")]
    pub backup_name: String,

    #[serde(rename = "includedNamespaces", default)]
    pub included_namespaces: Vec<String>,

    #[serde(rename = "excludedNamespaces", default)]
    pub excluded_namespaces: Vec<String>,

    #[serde(
        rename = "includedResources",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub included_resources: Vec<String>,

    #[serde(
        rename = "excludedResources",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub excluded_resources: Vec<String>,

    #[serde(rename = "restorePVs", default)]
    pub restore_pvs: bool,

    #[serde(rename = "includeClusterResources", default)]
    pub include_cluster_resources: bool,

    /// Source-namespace to target-namespace rewrites.
    #[serde(
        rename = "namespaceMapping",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub namespace_mapping: BTreeMap<String, String>,

    /// Restore of resource status fields, when requested.
    #[serde(rename = "restoreStatus", skip_serializing_if = "Option::is_none")]
    pub restore_status: Option<RestoreStatusSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct RestoreStatusSpec {
    #[serde(rename = "includedResources", default)]
    pub included_resources: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct RestoreStatus {
    /// New, InProgress, Completed, Failed, PartiallyFailed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<RestoreProgress>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct RestoreProgress {
    #[serde(rename = "totalItems", skip_serializing_if = "Option::is_none")]
    pub total_items: Option<i64>,

    #[serde(rename = "itemsRestored", skip_serializing_if = "Option::is_none")]
    pub items_restored: Option<i64>,
}

impl Restore {
    /// Current phase, defaulting to "New" when the server has not filled
    /// status yet.
    pub fn phase(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("New")
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self.phase(),
            RESTORE_PHASE_FAILED | RESTORE_PHASE_PARTIALLY_FAILED
        )
    }
}
