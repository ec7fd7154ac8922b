//! Failure kinds for one restore-test run.
//!
//! Every failure carries an explicit permanent/transient distinction: the
//! reconciler surfaces it as `status.result.retryable` so the re-invocation
//! scheduler knows whether another attempt can change the outcome.

use thiserror::Error;

/// Why a restore-test run failed.
#[derive(Debug, Error)]
pub enum TestFailure {
    /// The backup is missing or not in a restorable phase. Retrying cannot
    /// help until the backup itself changes.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A duration string did not match `<integer><unit>` with unit d/h/m/s.
    #[error("invalid duration {0:?}: expected <integer><unit> with unit one of d, h, m, s")]
    InvalidDuration(String),

    /// The RestoreTest spec is structurally invalid.
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// The restore reached a terminal failure phase.
    #[error("restore {name} {phase}: errors={errors}, warnings={warnings}")]
    RestoreFailed {
        name: String,
        phase: String,
        errors: usize,
        warnings: usize,
    },

    /// The restore did not reach a terminal phase before the deadline.
    #[error("restore {name} did not complete within {timeout_secs}s")]
    RestoreTimeout { name: String, timeout_secs: u64 },

    /// The restore disappeared while we were polling it.
    #[error("restore {0} not found while waiting for completion")]
    RestoreVanished(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Anything else, caught at the top of the run.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl TestFailure {
    /// Permanent failures are surfaced immediately and never retried;
    /// everything else is reported retryable-after-delay.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TestFailure::PreconditionFailed(_)
                | TestFailure::InvalidDuration(_)
                | TestFailure::InvalidSpec(_)
        )
    }
}
