pub mod clock;
pub mod error;
pub mod events;
pub mod health;
pub mod namespace;
pub mod notify;
pub mod rpo;
pub mod secrets;
pub mod velero;

pub use error::TestFailure;
pub use restore_test::{reconcile, Context, ReconcileError};

#[cfg(test)]
#[path = "restore_test_test.rs"]
mod restore_test_tests;
