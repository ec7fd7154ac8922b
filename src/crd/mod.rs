pub mod restore_test;
pub mod velero;
