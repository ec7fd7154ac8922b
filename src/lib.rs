//! lazarus: automated disaster-recovery validation for Kubernetes.
//!
//! Watches `RestoreTest` resources, restores the named Velero backup into an
//! isolated namespace, runs health checks against the restored workload,
//! measures recovery time, and tears the namespace down per the retention
//! policy.

pub mod config;
pub mod controller;
pub mod crd;
pub mod server;
