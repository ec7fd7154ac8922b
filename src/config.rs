//! Process configuration from `LAZARUS_`-prefixed environment variables.
//!
//! Built once at startup and passed by reference into the controller context
//! so tests can construct arbitrary configurations without touching the
//! environment.

use std::time::Duration;

/// Operator-level configuration.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace the operator itself runs in.
    pub operator_namespace: String,

    /// Prefix for generated test namespaces.
    pub test_namespace_prefix: String,

    /// Namespace where Velero is installed (Backup/Restore resources live
    /// there).
    pub velero_namespace: String,

    /// Maximum time to wait for a restore to reach a terminal phase.
    pub restore_timeout: Duration,

    /// Interval between restore status polls.
    pub restore_poll_interval: Duration,

    /// Delay between restore completion and the first health check, letting
    /// restored resources stabilize.
    pub settle_delay: Duration,

    /// Default TTL for test namespaces when the resource does not set one.
    pub default_ttl: Duration,

    /// Delete the test namespace after a successful run.
    pub cleanup_on_success: bool,

    /// Delete the test namespace after a failed run (off by default so
    /// failures can be inspected).
    pub cleanup_on_failure: bool,

    /// Requeue delay after a retryable failure.
    pub retry_delay: Duration,

    /// Slack webhook URL for notifications. None disables delivery.
    pub slack_webhook_url: Option<String>,

    /// Admission-level bound on concurrent test runs. The state machine does
    /// not enforce it; run identity (timestamped namespace and restore
    /// names) keeps concurrent runs independent.
    pub max_concurrent_tests: usize,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            operator_namespace: "lazarus-system".to_string(),
            test_namespace_prefix: "lazarus-test".to_string(),
            velero_namespace: "velero".to_string(),
            restore_timeout: Duration::from_secs(600),
            restore_poll_interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(5),
            default_ttl: Duration::from_secs(24 * 3600),
            cleanup_on_success: true,
            cleanup_on_failure: false,
            retry_delay: Duration::from_secs(60),
            slack_webhook_url: None,
            max_concurrent_tests: 5,
        }
    }
}

impl OperatorConfig {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = OperatorConfig::default();

        OperatorConfig {
            operator_namespace: env_string("LAZARUS_NAMESPACE", defaults.operator_namespace),
            test_namespace_prefix: env_string(
                "LAZARUS_TEST_NAMESPACE_PREFIX",
                defaults.test_namespace_prefix,
            ),
            velero_namespace: env_string("LAZARUS_VELERO_NAMESPACE", defaults.velero_namespace),
            restore_timeout: env_secs("LAZARUS_RESTORE_TIMEOUT", defaults.restore_timeout),
            restore_poll_interval: env_secs(
                "LAZARUS_RESTORE_POLL_INTERVAL",
                defaults.restore_poll_interval,
            ),
            settle_delay: env_secs("LAZARUS_SETTLE_DELAY", defaults.settle_delay),
            default_ttl: env_secs("LAZARUS_DEFAULT_TTL", defaults.default_ttl),
            cleanup_on_success: env_bool("LAZARUS_CLEANUP_ON_SUCCESS", defaults.cleanup_on_success),
            cleanup_on_failure: env_bool("LAZARUS_CLEANUP_ON_FAILURE", defaults.cleanup_on_failure),
            retry_delay: env_secs("LAZARUS_RETRY_DELAY", defaults.retry_delay),
            slack_webhook_url: std::env::var("LAZARUS_SLACK_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            max_concurrent_tests: env_usize(
                "LAZARUS_MAX_CONCURRENT_TESTS",
                defaults.max_concurrent_tests,
            ),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operational_expectations() {
        let cfg = OperatorConfig::default();
        assert_eq!(cfg.velero_namespace, "velero");
        assert_eq!(cfg.restore_timeout, Duration::from_secs(600));
        assert_eq!(cfg.restore_poll_interval, Duration::from_secs(5));
        assert!(cfg.cleanup_on_success);
        assert!(!cfg.cleanup_on_failure);
        assert_eq!(cfg.default_ttl, Duration::from_secs(86400));
    }
}
