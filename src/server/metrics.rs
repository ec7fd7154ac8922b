//! Prometheus metrics for the operator.
//!
//! One registry, created at startup and shared between the controller (which
//! records) and the HTTP server (which encodes for scraping). Metric
//! recording never fails a run.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

struct Inner {
    registry: Registry,
    tests_total: IntCounterVec,
    test_duration_seconds: HistogramVec,
    restore_duration_seconds: HistogramVec,
    resources_restored: IntGaugeVec,
    health_checks_total: IntCounterVec,
    health_check_duration_seconds: HistogramVec,
    rto_seconds: HistogramVec,
    rpo_seconds: IntGaugeVec,
    active_tests: IntGauge,
    cleanup_total: IntCounterVec,
}

/// Cheaply cloneable handle to the operator metrics registry.
#[derive(Clone)]
pub struct SharedMetrics {
    inner: Arc<Inner>,
}

/// Create the metrics registry with all operator metric families registered.
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    let registry = Registry::new();

    let tests_total = IntCounterVec::new(
        Opts::new(
            "lazarus_restore_tests_total",
            "Total number of restore tests executed",
        ),
        &["backup_name", "result"],
    )?;
    registry.register(Box::new(tests_total.clone()))?;

    let test_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "lazarus_restore_test_duration_seconds",
            "Duration of restore tests in seconds",
        )
        .buckets(vec![
            10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1800.0, 3600.0,
        ]),
        &["backup_name"],
    )?;
    registry.register(Box::new(test_duration_seconds.clone()))?;

    let restore_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "lazarus_restore_duration_seconds",
            "Duration of the restore operation in seconds",
        )
        .buckets(vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1800.0]),
        &["backup_name"],
    )?;
    registry.register(Box::new(restore_duration_seconds.clone()))?;

    let resources_restored = IntGaugeVec::new(
        Opts::new(
            "lazarus_resources_restored_total",
            "Number of resources restored from backup",
        ),
        &["backup_name"],
    )?;
    registry.register(Box::new(resources_restored.clone()))?;

    let health_checks_total = IntCounterVec::new(
        Opts::new(
            "lazarus_health_checks_total",
            "Total number of health checks executed",
        ),
        &["check_name", "result"],
    )?;
    registry.register(Box::new(health_checks_total.clone()))?;

    let health_check_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "lazarus_health_check_duration_seconds",
            "Duration of health checks in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["check_name"],
    )?;
    registry.register(Box::new(health_check_duration_seconds.clone()))?;

    let rto_seconds = HistogramVec::new(
        HistogramOpts::new(
            "lazarus_recovery_time_objective_seconds",
            "Measured Recovery Time Objective in seconds",
        )
        .buckets(vec![60.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0]),
        &["backup_name"],
    )?;
    registry.register(Box::new(rto_seconds.clone()))?;

    let rpo_seconds = IntGaugeVec::new(
        Opts::new(
            "lazarus_recovery_point_objective_seconds",
            "Estimated Recovery Point Objective in seconds",
        ),
        &["backup_name"],
    )?;
    registry.register(Box::new(rpo_seconds.clone()))?;

    let active_tests = IntGauge::new(
        "lazarus_active_tests",
        "Number of currently running restore tests",
    )?;
    registry.register(Box::new(active_tests.clone()))?;

    let cleanup_total = IntCounterVec::new(
        Opts::new(
            "lazarus_cleanup_operations_total",
            "Total number of cleanup operations",
        ),
        &["result"],
    )?;
    registry.register(Box::new(cleanup_total.clone()))?;

    Ok(SharedMetrics {
        inner: Arc::new(Inner {
            registry,
            tests_total,
            test_duration_seconds,
            restore_duration_seconds,
            resources_restored,
            health_checks_total,
            health_check_duration_seconds,
            rto_seconds,
            rpo_seconds,
            active_tests,
            cleanup_total,
        }),
    })
}

impl SharedMetrics {
    /// Encode all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.inner.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn record_test_start(&self) {
        self.inner.active_tests.inc();
    }

    pub fn record_test_complete(
        &self,
        backup_name: &str,
        success: bool,
        duration_secs: f64,
        rto_secs: f64,
        rpo_secs: i64,
    ) {
        let result = if success { "success" } else { "failure" };
        self.inner
            .tests_total
            .with_label_values(&[backup_name, result])
            .inc();
        self.inner
            .test_duration_seconds
            .with_label_values(&[backup_name])
            .observe(duration_secs);
        self.inner
            .rto_seconds
            .with_label_values(&[backup_name])
            .observe(rto_secs);
        self.inner
            .rpo_seconds
            .with_label_values(&[backup_name])
            .set(rpo_secs);
        self.inner.active_tests.dec();
    }

    pub fn record_restore_duration(&self, backup_name: &str, duration_secs: f64) {
        self.inner
            .restore_duration_seconds
            .with_label_values(&[backup_name])
            .observe(duration_secs);
    }

    pub fn record_resources_restored(&self, backup_name: &str, count: i64) {
        self.inner
            .resources_restored
            .with_label_values(&[backup_name])
            .set(count);
    }

    pub fn record_health_check(&self, check_name: &str, success: bool, duration_secs: f64) {
        let result = if success { "pass" } else { "fail" };
        self.inner
            .health_checks_total
            .with_label_values(&[check_name, result])
            .inc();
        self.inner
            .health_check_duration_seconds
            .with_label_values(&[check_name])
            .observe(duration_secs);
    }

    pub fn record_cleanup(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.inner
            .cleanup_total
            .with_label_values(&[result])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_tests_gauge_tracks_start_and_complete() {
        let metrics = create_metrics().unwrap();
        metrics.record_test_start();
        metrics.record_test_start();
        metrics.record_test_complete("nightly-01", true, 120.0, 120.0, 0);

        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("lazarus_active_tests 1"));
        assert!(encoded
            .contains("lazarus_restore_tests_total{backup_name=\"nightly-01\",result=\"success\"} 1"));
    }

    #[test]
    fn health_check_outcomes_are_labeled() {
        let metrics = create_metrics().unwrap();
        metrics.record_health_check("http-endpoints", true, 0.3);
        metrics.record_health_check("database-health", false, 2.0);

        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains(
            "lazarus_health_checks_total{check_name=\"http-endpoints\",result=\"pass\"} 1"
        ));
        assert!(encoded.contains(
            "lazarus_health_checks_total{check_name=\"database-health\",result=\"fail\"} 1"
        ));
    }

    #[test]
    fn cleanup_operations_are_counted() {
        let metrics = create_metrics().unwrap();
        metrics.record_cleanup(true);
        metrics.record_cleanup(true);
        metrics.record_cleanup(false);

        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("lazarus_cleanup_operations_total{result=\"success\"} 2"));
        assert!(encoded.contains("lazarus_cleanup_operations_total{result=\"failure\"} 1"));
    }
}
