//! Health-check execution against restored workloads.
//!
//! Each check variant implements a single `attempt()`; the shared retry
//! wrapper adds per-attempt timeouts and exponential backoff, and the runner
//! executes all active checks concurrently, so total wall time approaches
//! the slowest check rather than the sum.

mod database;
mod http;

pub use database::DatabaseHealthCheck;
pub use http::HttpHealthCheck;

use crate::controller::secrets::SecretReader;
use crate::crd::restore_test::HealthCheckSpec;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one health check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
    Error,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Passed => write!(f, "Passed"),
            CheckStatus::Failed => write!(f, "Failed"),
            CheckStatus::Skipped => write!(f, "Skipped"),
            CheckStatus::Error => write!(f, "Error"),
        }
    }
}

/// Result of one health check, produced once per check after retries.
#[derive(Clone, Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    /// Wall-clock duration of the full retry sequence, backoff included.
    pub duration: Duration,
    pub details: Option<serde_json::Value>,
}

impl CheckResult {
    pub fn passed(name: &str, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Passed, message)
    }

    pub fn failed(name: &str, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Failed, message)
    }

    pub fn error(name: &str, message: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Error, message)
    }

    fn with_status(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        CheckResult {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: Duration::ZERO,
            details: None,
        }
    }
}

/// Aggregated results from all checks of one run.
#[derive(Clone, Debug)]
pub struct TestResults {
    pub checks: Vec<CheckResult>,
    /// True only when every check passed. Zero checks is vacuously true.
    pub overall_success: bool,
    pub total_duration: Duration,
}

impl TestResults {
    pub fn passed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Passed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| c.status == CheckStatus::Failed)
            .count()
    }
}

/// One validation capability.
///
/// `attempt` is a single try with no retry logic of its own. Expected
/// operational failures come back as `Ok` with `CheckStatus::Failed`;
/// unexpected errors come back as `Err` and are retried by the wrapper.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    /// Per-attempt timeout.
    fn timeout(&self) -> Duration;

    /// Maximum attempts before the check reports an error.
    fn retries(&self) -> u32;

    async fn attempt(&self) -> anyhow::Result<CheckResult>;
}

/// Run a check with bounded retry and exponential backoff.
///
/// Each attempt is bounded by the check's timeout; a timeout or error sleeps
/// `2^attempt` seconds before the next try. Exhausting all attempts yields
/// `CheckStatus::Error` carrying the last error.
pub async fn run_with_retry(check: &dyn HealthCheck) -> CheckResult {
    let started = tokio::time::Instant::now();
    let attempts = check.retries().max(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        debug!(
            check = check.name(),
            attempt = attempt + 1,
            max = attempts,
            "Executing health check"
        );

        match tokio::time::timeout(check.timeout(), check.attempt()).await {
            Ok(Ok(mut result)) => {
                result.duration = started.elapsed();
                return result;
            }
            Ok(Err(e)) => {
                last_error = e.to_string();
                warn!(
                    check = check.name(),
                    attempt = attempt + 1,
                    error = %last_error,
                    "Health check error"
                );
            }
            Err(_) => {
                last_error = format!("check timed out after {}s", check.timeout().as_secs());
                warn!(check = check.name(), attempt = attempt + 1, "Health check timeout");
            }
        }

        if attempt + 1 < attempts {
            tokio::time::sleep(Duration::from_secs(1u64 << attempt)).await;
        }
    }

    let mut result = CheckResult::error(
        check.name(),
        format!("check failed after {attempts} attempts: {last_error}"),
    );
    result.duration = started.elapsed();
    result
}

/// Builds active checks from configuration and runs them concurrently.
pub struct HealthCheckRunner {
    checks: Vec<Box<dyn HealthCheck>>,
}

impl HealthCheckRunner {
    /// Include a category only when its spec marks it enabled. Zero checks
    /// is valid and yields a vacuous pass.
    pub fn build(
        spec: &HealthCheckSpec,
        target_namespace: &str,
        secrets: Arc<dyn SecretReader>,
        http_client: reqwest::Client,
    ) -> Self {
        let mut checks: Vec<Box<dyn HealthCheck>> = Vec::new();

        if let Some(db) = &spec.database {
            if db.enabled {
                checks.push(Box::new(DatabaseHealthCheck::new(
                    "database-health",
                    db.clone(),
                    secrets,
                    target_namespace,
                )));
            }
        }

        if let Some(http) = &spec.http {
            if http.enabled {
                checks.push(Box::new(HttpHealthCheck::new(
                    "http-endpoints",
                    http.clone(),
                    http_client,
                )));
            }
        }

        info!(count = checks.len(), "Built health checks");
        HealthCheckRunner { checks }
    }

    /// Assemble a runner from already-built checks.
    pub fn from_checks(checks: Vec<Box<dyn HealthCheck>>) -> Self {
        HealthCheckRunner { checks }
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Execute all checks concurrently and aggregate the verdict.
    ///
    /// Checks have no ordering guarantee among themselves; all results are
    /// collected before the verdict is computed, and a failing check never
    /// suppresses its siblings.
    pub async fn run_all(&self) -> TestResults {
        let started = tokio::time::Instant::now();

        if self.checks.is_empty() {
            warn!("No health checks configured");
            return TestResults {
                checks: Vec::new(),
                overall_success: true,
                total_duration: Duration::ZERO,
            };
        }

        info!(count = self.checks.len(), "Starting health checks");
        let results = join_all(self.checks.iter().map(|c| run_with_retry(c.as_ref()))).await;

        let overall_success = results.iter().all(|r| r.status == CheckStatus::Passed);
        let outcome = TestResults {
            checks: results,
            overall_success,
            total_duration: started.elapsed(),
        };

        info!(
            passed = outcome.passed_count(),
            failed = outcome.failed_count(),
            duration_secs = outcome.total_duration.as_secs_f64(),
            "Health checks completed"
        );

        outcome
    }
}
