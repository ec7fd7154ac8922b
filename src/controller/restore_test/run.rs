//! The restore-test state machine: one run from backup verification to
//! deferred cleanup, building the status record step by step.

use super::reconcile::Context;
use super::validation::{
    generate_restore_name, generate_test_namespace_name, parse_duration, validate_spec,
    validate_target_namespace,
};
use crate::controller::error::TestFailure;
use crate::controller::health::{CheckStatus, HealthCheckRunner};
use crate::controller::namespace::{schedule_deferred_cleanup, test_namespace_labels};
use crate::controller::notify::{FailureNote, SuccessNote};
use crate::controller::velero::RestoreGateway;
use crate::crd::restore_test::{
    CheckResultRecord, HealthChecksPhase, HealthChecksRecord, RestorePhase,
    RestoreProgressCounts, RestoreRecord, RestoreTest, RestoreTestStatus, TestPhase,
    TestResultRecord,
};
use chrono::{DateTime, SecondsFormat, Utc};
use kube::ResourceExt;
use tracing::{error, info};

/// Result of one run: the status to patch, plus the failure (if any) that
/// drives the requeue decision.
pub struct RunOutcome {
    pub status: RestoreTestStatus,
    pub failure: Option<TestFailure>,
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn elapsed_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    end.signed_duration_since(start).num_milliseconds() as f64 / 1000.0
}

/// Drive one restore test to a terminal status.
///
/// Every failure is caught here and folded into the status record; the
/// `retryable` flag tells the reconciler whether another attempt can change
/// the outcome.
pub async fn run_restore_test(rt: &RestoreTest, ctx: &Context) -> RunOutcome {
    let name = rt.name_any();
    let started = ctx.clock.now();

    let mut status = RestoreTestStatus {
        phase: Some(TestPhase::Running),
        start_time: Some(rfc3339(started)),
        completion_time: None,
        test_namespace: None,
        restore: Some(RestoreRecord {
            phase: Some(RestorePhase::Pending),
            ..Default::default()
        }),
        health_checks: Some(HealthChecksRecord {
            phase: Some(HealthChecksPhase::Pending),
            results: Vec::new(),
        }),
        result: None,
    };

    if let Some(metrics) = &ctx.metrics {
        metrics.record_test_start();
    }

    match execute(rt, ctx, started, &mut status).await {
        Ok(()) => RunOutcome {
            status,
            failure: None,
        },
        Err(failure) => {
            error!(test = %name, error = %failure, "Restore test failed");

            let completed = ctx.clock.now();
            status.phase = Some(TestPhase::Failed);
            if status.completion_time.is_none() {
                status.completion_time = Some(rfc3339(completed));
            }
            status.result = Some(TestResultRecord {
                success: false,
                rto: None,
                rpo: None,
                message: format!("Test failed: {failure}"),
                resources_recovered: None,
                resources_failed: None,
                retryable: Some(!failure.is_permanent()),
            });

            if let Some(metrics) = &ctx.metrics {
                metrics.record_test_complete(
                    &rt.spec.backup_name,
                    false,
                    elapsed_secs(started, completed),
                    0.0,
                    0,
                );
            }

            ctx.events
                .publish(
                    rt,
                    "TestError",
                    &format!("Restore test encountered error: {failure}"),
                    true,
                )
                .await;

            let notifications = rt.spec.notifications.clone().unwrap_or_default();
            if notifications.on_failure {
                ctx.notifier
                    .notify_failure(&FailureNote {
                        test_name: name,
                        backup_name: rt.spec.backup_name.clone(),
                        error: failure.to_string(),
                        completed_at: status.completion_time.clone().unwrap_or_default(),
                        mention: notifications.mention_on_failure.clone(),
                    })
                    .await;
            }

            RunOutcome {
                status,
                failure: Some(failure),
            }
        }
    }
}

async fn execute(
    rt: &RestoreTest,
    ctx: &Context,
    started: DateTime<Utc>,
    status: &mut RestoreTestStatus,
) -> Result<(), TestFailure> {
    let name = rt.name_any();
    let backup_name = rt.spec.backup_name.clone();

    validate_spec(rt, &ctx.config)?;

    // Resolve the target namespace before touching the cluster.
    let target_namespace = match &rt.spec.restore_namespace {
        Some(namespace) => namespace.clone(),
        None => {
            let generated = generate_test_namespace_name(
                &backup_name,
                &ctx.config.test_namespace_prefix,
                started,
            );
            info!(namespace = %generated, "Generated restore namespace");
            generated
        }
    };
    validate_target_namespace(&target_namespace, &ctx.config)?;

    // Step 1: the backup must exist and be Completed. Checked before any
    // namespace is created so a permanent precondition failure leaves no
    // residue behind.
    let backup = ctx.velero.verify_backup(&backup_name).await?;
    ctx.events
        .publish(
            rt,
            "BackupVerified",
            &format!("Backup {backup_name} verified and ready for restore"),
            false,
        )
        .await;

    // Step 2: provision the isolated namespace (idempotent).
    status.test_namespace = Some(target_namespace.clone());
    ctx.namespaces
        .create(&target_namespace, test_namespace_labels(&backup_name))
        .await?;

    // Step 3: submit the restore.
    let restore_name = generate_restore_name(&backup_name, started);
    let filters = rt.spec.restore.clone().unwrap_or_default();
    let restore_started = ctx.clock.now();
    ctx.velero
        .submit_restore(&restore_name, &backup_name, &target_namespace, &filters)
        .await?;

    if let Some(record) = status.restore.as_mut() {
        record.restore_name = Some(restore_name.clone());
        record.phase = Some(RestorePhase::InProgress);
    }
    ctx.events
        .publish(
            rt,
            "RestoreCreated",
            &format!("Restore {restore_name} created"),
            false,
        )
        .await;

    // Step 4: poll to completion. Timeouts and terminal failure phases fail
    // the run; the reconciler decides whether a retry makes sense.
    let restore = ctx
        .velero
        .await_completion(
            &restore_name,
            ctx.config.restore_timeout,
            ctx.config.restore_poll_interval,
        )
        .await?;

    if let Some(metrics) = &ctx.metrics {
        metrics.record_restore_duration(
            &backup_name,
            elapsed_secs(restore_started, ctx.clock.now()),
        );
    }

    // Step 5: record restore statistics.
    let stats = RestoreGateway::parse_stats(&restore);
    info!(
        restore = %restore_name,
        items_restored = stats.items_restored,
        items_attempted = stats.items_attempted,
        errors = stats.errors,
        "Restore completed"
    );

    if let Some(record) = status.restore.as_mut() {
        record.phase = Some(RestorePhase::Completed);
        record.progress = Some(RestoreProgressCounts {
            items_attempted: stats.items_attempted,
            items_restored: stats.items_restored,
        });
        record.errors = Some(stats.errors as i64);
    }
    if let Some(metrics) = &ctx.metrics {
        metrics.record_resources_restored(&backup_name, stats.items_restored);
    }
    ctx.events
        .publish(
            rt,
            "RestoreCompleted",
            &format!(
                "Restore completed: {} resources restored",
                stats.items_restored
            ),
            false,
        )
        .await;

    // Step 6: health checks, unless disabled.
    let hc_spec = rt.spec.health_checks.clone().unwrap_or_default();
    let overall_success = if hc_spec.enabled {
        if let Some(record) = status.health_checks.as_mut() {
            record.phase = Some(HealthChecksPhase::Running);
        }

        // Let restored resources stabilize before probing them.
        tokio::time::sleep(ctx.config.settle_delay).await;

        let runner = HealthCheckRunner::build(
            &hc_spec,
            &target_namespace,
            ctx.secrets.clone(),
            ctx.http_client.clone(),
        );
        let results = runner.run_all().await;

        if let Some(metrics) = &ctx.metrics {
            for check in &results.checks {
                metrics.record_health_check(
                    &check.name,
                    check.status == CheckStatus::Passed,
                    check.duration.as_secs_f64(),
                );
            }
        }

        if let Some(record) = status.health_checks.as_mut() {
            record.phase = Some(HealthChecksPhase::Completed);
            record.results = results
                .checks
                .iter()
                .map(|c| CheckResultRecord {
                    name: c.name.clone(),
                    status: c.status.to_string(),
                    message: c.message.clone(),
                    duration: c.duration.as_secs_f64(),
                })
                .collect();
        }

        results.overall_success
    } else {
        info!(test = %name, "Health checks disabled");
        if let Some(record) = status.health_checks.as_mut() {
            record.phase = Some(HealthChecksPhase::Skipped);
        }
        true
    };

    // Step 7: compute the result. RTO is wall time across the whole run;
    // RPO comes from the configured estimator.
    let completed = ctx.clock.now();
    let rto = completed.signed_duration_since(started).num_seconds();
    let rpo = ctx.rpo.estimate(&backup, started);

    status.completion_time = Some(rfc3339(completed));
    status.result = Some(TestResultRecord {
        success: overall_success,
        rto: Some(rto),
        rpo: Some(rpo),
        message: if overall_success {
            "Restore test completed successfully".to_string()
        } else {
            "Restore test failed health checks".to_string()
        },
        resources_recovered: Some(stats.items_restored),
        resources_failed: Some(stats.errors as i64),
        retryable: Some(false),
    });
    status.phase = Some(if overall_success {
        TestPhase::Succeeded
    } else {
        TestPhase::Failed
    });

    if overall_success {
        ctx.events
            .publish(
                rt,
                "TestSucceeded",
                &format!("Backup restore test passed (RTO: {rto}s)"),
                false,
            )
            .await;
    } else {
        ctx.events
            .publish(
                rt,
                "TestFailed",
                "Backup restore test failed health checks",
                true,
            )
            .await;
    }

    if let Some(metrics) = &ctx.metrics {
        metrics.record_test_complete(
            &backup_name,
            overall_success,
            elapsed_secs(started, completed),
            rto as f64,
            rpo,
        );
    }

    // Step 8: notifications per spec toggles. Best-effort by construction.
    let notifications = rt.spec.notifications.clone().unwrap_or_default();
    if overall_success && notifications.on_success {
        ctx.notifier
            .notify_success(&SuccessNote {
                test_name: name.clone(),
                backup_name: backup_name.clone(),
                rto_seconds: rto,
                rpo_seconds: rpo,
                resources_restored: stats.items_restored,
                completed_at: rfc3339(completed),
            })
            .await;
    } else if !overall_success && notifications.on_failure {
        ctx.notifier
            .notify_failure(&FailureNote {
                test_name: name.clone(),
                backup_name: backup_name.clone(),
                error: "Restore test failed health checks".to_string(),
                completed_at: rfc3339(completed),
                mention: notifications.mention_on_failure.clone(),
            })
            .await;
    }

    // Step 9: deferred cleanup per policy. Detached; the run never awaits it.
    let cleanup_enabled = rt.spec.cleanup.clone().unwrap_or_default().enabled;
    let policy_wants_cleanup = (overall_success && ctx.config.cleanup_on_success)
        || (!overall_success && ctx.config.cleanup_on_failure);
    if cleanup_enabled && policy_wants_cleanup {
        let ttl = match &rt.spec.ttl {
            Some(raw) => parse_duration(raw)?,
            None => ctx.config.default_ttl,
        };
        schedule_deferred_cleanup(
            ctx.namespaces.clone(),
            ctx.velero.clone(),
            ctx.metrics.clone(),
            target_namespace,
            restore_name,
            ttl,
        );
    }

    Ok(())
}
