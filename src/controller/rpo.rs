//! Recovery-point-objective estimation.
//!
//! RPO is how stale the restored data was at the moment the test started.
//! The estimator is a pluggable strategy: `ZeroRpo` keeps the historical
//! always-zero placeholder, `BackupAgeRpo` derives staleness from the
//! backup's completion timestamp.

use crate::crd::velero::Backup;
use chrono::{DateTime, Utc};

pub trait RpoEstimator: Send + Sync {
    /// Estimated staleness in seconds at `run_start`.
    fn estimate(&self, backup: &Backup, run_start: DateTime<Utc>) -> i64;
}

/// Always reports zero. The default, so existing dashboards keep their
/// meaning until a real estimate is wired in.
pub struct ZeroRpo;

impl RpoEstimator for ZeroRpo {
    fn estimate(&self, _backup: &Backup, _run_start: DateTime<Utc>) -> i64 {
        0
    }
}

/// Derives staleness from the backup's completion timestamp: data restored
/// from the backup is at most `run_start - completionTimestamp` old. Falls
/// back to zero when the timestamp is absent or unparseable.
pub struct BackupAgeRpo;

impl RpoEstimator for BackupAgeRpo {
    fn estimate(&self, backup: &Backup, run_start: DateTime<Utc>) -> i64 {
        backup
            .status
            .as_ref()
            .and_then(|s| s.completion_timestamp.as_deref())
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|completed| {
                run_start
                    .signed_duration_since(completed.with_timezone(&Utc))
                    .num_seconds()
                    .max(0)
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::velero::BackupStatus;

    fn backup_completed_at(ts: Option<&str>) -> Backup {
        Backup {
            metadata: Default::default(),
            spec: Default::default(),
            status: Some(BackupStatus {
                phase: Some("Completed".to_string()),
                completion_timestamp: ts.map(String::from),
            }),
        }
    }

    #[test]
    fn zero_rpo_is_always_zero() {
        let backup = backup_completed_at(Some("2026-08-01T00:00:00Z"));
        assert_eq!(ZeroRpo.estimate(&backup, Utc::now()), 0);
    }

    #[test]
    fn backup_age_rpo_measures_staleness() {
        let backup = backup_completed_at(Some("2026-08-01T00:00:00Z"));
        let run_start = DateTime::parse_from_rfc3339("2026-08-01T06:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(BackupAgeRpo.estimate(&backup, run_start), 6 * 3600);
    }

    #[test]
    fn backup_age_rpo_defaults_to_zero_without_timestamp() {
        let backup = backup_completed_at(None);
        assert_eq!(BackupAgeRpo.estimate(&backup, Utc::now()), 0);
    }

    #[test]
    fn backup_age_rpo_clamps_clock_skew_to_zero() {
        let backup = backup_completed_at(Some("2026-08-01T06:00:00Z"));
        let run_start = DateTime::parse_from_rfc3339("2026-08-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(BackupAgeRpo.estimate(&backup, run_start), 0);
    }
}
