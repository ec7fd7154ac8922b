use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// RestoreTest is a Custom Resource describing one disaster-recovery
/// validation run: restore a named backup into an isolated namespace, run
/// health checks against the restored workload, and report pass/fail with
/// recovery-time metrics.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "lazarus.io",
    version = "v1alpha1",
    kind = "RestoreTest",
    namespaced,
    status = "RestoreTestStatus",
    printcolumn = r#"{"name":"Backup", "type":"string", "jsonPath":".spec.backupName"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Success", "type":"boolean", "jsonPath":".status.result.success"}"#,
    printcolumn = r#"{"name":"RTO", "type":"integer", "jsonPath":".status.result.rto"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct RestoreTestSpec {
    /// Name of the Velero backup to validate. The backup must be Completed.
    #[serde(rename = "backupName")]
    pub backup_name: String,

    /// Target namespace for the restored workload. Derived from the backup
    /// name and a timestamp when not supplied.
    #[serde(rename = "restoreNamespace", skip_serializing_if = "Option::is_none")]
    pub restore_namespace: Option<String>,

    /// Resource and namespace filters applied to the restore.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore: Option<RestoreFilters>,

    /// Health checks to run against the restored workload.
    #[serde(rename = "healthChecks", skip_serializing_if = "Option::is_none")]
    pub health_checks: Option<HealthCheckSpec>,

    /// Cleanup behavior for the test namespace after the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupSpec>,

    /// How long the test namespace is kept before deferred cleanup,
    /// e.g. "24h", "30m". Defaults to the operator-level TTL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,

    /// Notification toggles for run outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationSpec>,
}

/// Namespace and resource filters for the underlying restore operation.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct RestoreFilters {
    /// Source namespaces to restore from the backup. "*" means all.
    #[serde(
        rename = "includedNamespaces",
        default = "default_included_namespaces"
    )]
    pub included_namespaces: Vec<String>,

    /// Source namespaces excluded from the restore.
    #[serde(
        rename = "excludedNamespaces",
        default = "default_excluded_namespaces"
    )]
    pub excluded_namespaces: Vec<String>,

    /// Resource kinds to include (empty = all).
    #[serde(rename = "includedResources", default)]
    pub included_resources: Vec<String>,

    /// Resource kinds to exclude.
    #[serde(rename = "excludedResources", default)]
    pub excluded_resources: Vec<String>,

    /// Whether to also restore resource status fields.
    #[serde(rename = "restoreStatus", default)]
    pub restore_status: bool,
}

impl Default for RestoreFilters {
    fn default() -> Self {
        RestoreFilters {
            included_namespaces: default_included_namespaces(),
            excluded_namespaces: default_excluded_namespaces(),
            included_resources: Vec::new(),
            excluded_resources: Vec::new(),
            restore_status: false,
        }
    }
}

fn default_included_namespaces() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_excluded_namespaces() -> Vec<String> {
    vec![
        "kube-system".to_string(),
        "velero".to_string(),
        "lazarus-system".to_string(),
    ]
}

/// Health-check configuration for one run.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct HealthCheckSpec {
    /// Master toggle. When false the run skips checks and counts them as
    /// passed.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database connectivity and query validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseCheckSpec>,

    /// HTTP endpoint validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpCheckSpec>,
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        HealthCheckSpec {
            enabled: true,
            database: None,
            http: None,
        }
    }
}

/// Database health-check category.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct DatabaseCheckSpec {
    #[serde(default)]
    pub enabled: bool,

    /// Database backend kind: "postgres" or "mysql". Anything else yields a
    /// check error.
    #[serde(default = "default_db_kind", rename = "type")]
    pub kind: String,

    /// Where the connection string comes from.
    #[serde(rename = "connectionString", skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionSource>,

    /// Queries whose scalar results are validated.
    #[serde(default)]
    pub queries: Vec<QuerySpec>,

    /// Per-attempt timeout in seconds.
    #[serde(rename = "timeoutSeconds", default = "default_check_timeout")]
    pub timeout_seconds: u64,

    /// Maximum attempts before the check reports an error.
    #[serde(default = "default_check_retries")]
    pub retries: u32,
}

fn default_db_kind() -> String {
    "postgres".to_string()
}

/// A connection string supplied inline or read from a Secret.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct ConnectionSource {
    /// Literal connection string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Reference to a Secret key holding the connection string.
    #[serde(rename = "secretRef", skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeyRef>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
    /// Namespace of the Secret. Defaults to the test's target namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// One validation query with an optional expected range for its scalar
/// result.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct QuerySpec {
    pub name: String,
    pub sql: String,
    #[serde(rename = "expectedRange", skip_serializing_if = "Option::is_none")]
    pub expected_range: Option<ExpectedRange>,
}

/// Inclusive bounds for a query result. Missing bounds are open.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct ExpectedRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// HTTP health-check category.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct HttpCheckSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,

    /// Per-attempt timeout in seconds.
    #[serde(rename = "timeoutSeconds", default = "default_check_timeout")]
    pub timeout_seconds: u64,

    /// Maximum attempts before the check reports an error.
    #[serde(default = "default_check_retries")]
    pub retries: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct EndpointSpec {
    pub name: String,
    pub url: String,

    /// Expected HTTP status code.
    #[serde(rename = "expectedStatus", default = "default_expected_status")]
    pub expected_status: u16,

    /// Substring the response body must contain.
    #[serde(rename = "bodyContains", skip_serializing_if = "Option::is_none")]
    pub body_contains: Option<String>,
}

fn default_expected_status() -> u16 {
    200
}

fn default_check_timeout() -> u64 {
    30
}

fn default_check_retries() -> u32 {
    3
}

/// Cleanup behavior. Whether cleanup actually happens for a given outcome is
/// decided by the operator-level success/failure policy.
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
pub struct CleanupSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CleanupSpec {
    fn default() -> Self {
        CleanupSpec { enabled: true }
    }
}

/// Notification toggles for run outcomes.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
pub struct NotificationSpec {
    #[serde(rename = "onSuccess", default)]
    pub on_success: bool,

    #[serde(rename = "onFailure", default)]
    pub on_failure: bool,

    /// Slack handle to mention when a failure notification fires.
    #[serde(rename = "mentionOnFailure", skip_serializing_if = "Option::is_none")]
    pub mention_on_failure: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Top-level phase of one restore test. Transitions are one-directional
/// within a run attempt: Running -> Succeeded | Failed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum TestPhase {
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for TestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestPhase::Running => write!(f, "Running"),
            TestPhase::Succeeded => write!(f, "Succeeded"),
            TestPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Sub-phase of the restore step.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum RestorePhase {
    Pending,
    InProgress,
    Completed,
}

/// Sub-phase of the health-check step.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum HealthChecksPhase {
    Pending,
    Running,
    Completed,
    Skipped,
}

/// Status of one RestoreTest, built incrementally as the run progresses and
/// patched through the status subresource.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct RestoreTestStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<TestPhase>,

    /// RFC3339 timestamp of run start.
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    /// RFC3339 timestamp of run completion. Set exactly once, together with
    /// the terminal phase.
    #[serde(rename = "completionTime", skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,

    /// Resolved target namespace of this run. Recorded so teardown can find
    /// generated namespaces.
    #[serde(rename = "testNamespace", skip_serializing_if = "Option::is_none")]
    pub test_namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore: Option<RestoreRecord>,

    #[serde(rename = "healthChecks", skip_serializing_if = "Option::is_none")]
    pub health_checks: Option<HealthChecksRecord>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TestResultRecord>,
}

/// Progress of the restore step.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct RestoreRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<RestorePhase>,

    #[serde(rename = "restoreName", skip_serializing_if = "Option::is_none")]
    pub restore_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<RestoreProgressCounts>,

    /// Number of errors reported by the restore.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct RestoreProgressCounts {
    #[serde(rename = "itemsAttempted")]
    pub items_attempted: i64,
    #[serde(rename = "itemsRestored")]
    pub items_restored: i64,
}

/// Outcome of the health-check step.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct HealthChecksRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<HealthChecksPhase>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<CheckResultRecord>,
}

/// One health-check result as recorded in status.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct CheckResultRecord {
    pub name: String,
    /// Passed, Failed, Skipped or Error.
    pub status: String,
    pub message: String,
    /// Wall-clock duration in seconds, covering the full retry sequence.
    pub duration: f64,
}

/// Final result of the run.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct TestResultRecord {
    pub success: bool,

    /// Measured recovery time in seconds (run start to completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rto: Option<i64>,

    /// Estimated recovery-point staleness in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpo: Option<i64>,

    pub message: String,

    #[serde(rename = "resourcesRecovered", skip_serializing_if = "Option::is_none")]
    pub resources_recovered: Option<i64>,

    #[serde(rename = "resourcesFailed", skip_serializing_if = "Option::is_none")]
    pub resources_failed: Option<i64>,

    /// Whether the external scheduler may re-invoke this run. False for
    /// permanent failures (missing or incomplete backup, invalid spec).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

#[cfg(test)]
#[path = "restore_test_test.rs"]
mod tests;
