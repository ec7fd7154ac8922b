use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use lazarus::config::OperatorConfig;
use lazarus::controller::{reconcile, Context, ReconcileError};
use lazarus::crd::restore_test::RestoreTest;
use lazarus::server::{
    create_metrics, run_health_server, shutdown_channel, wait_for_signal, ReadinessState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default port for health and metrics endpoints
const HEALTH_PORT: u16 = 8080;

/// Error policy for the controller
///
/// Reconciliation errors here are API-level (status patch, finalizer
/// bookkeeping); run failures carry their own requeue decision inside
/// `reconcile`. Uses `warn!` since these errors are expected and retried.
pub fn error_policy(
    _restore_test: Arc<RestoreTest>,
    error: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    warn!("Reconcile error (will retry): {:?}", error);
    Action::requeue(Duration::from_secs(10))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = OperatorConfig::from_env();
    info!(
        operator_namespace = %config.operator_namespace,
        velero_namespace = %config.velero_namespace,
        max_concurrent_tests = config.max_concurrent_tests,
        "Starting lazarus restore-test operator"
    );

    // Create shutdown channel for coordinated shutdown
    let (shutdown_controller, _shutdown_signal) = shutdown_channel();

    // Create readiness state (initially not ready)
    let readiness = ReadinessState::new();

    // Create metrics registry
    let metrics = create_metrics().expect("Failed to create metrics registry");
    info!("Prometheus metrics registry initialized");

    // Create Kubernetes client
    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    // Start health/metrics server in background
    let health_readiness = readiness.clone();
    let health_metrics = metrics.clone();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = run_health_server(HEALTH_PORT, health_readiness, health_metrics).await {
            warn!(error = %e, "Health server failed");
        }
    });
    info!(port = HEALTH_PORT, "Server task spawned");

    // Create API for RestoreTest resources
    let restore_tests = Api::<RestoreTest>::all(client.clone());

    // Create controller context with production collaborators
    let ctx = Arc::new(Context::for_cluster(
        client.clone(),
        config,
        Some(metrics.clone()),
    ));

    // Mark as ready - controller is initialized and about to start
    readiness.set_ready();
    info!("Controller ready, starting reconciliation loop");

    // Create the controller stream
    // Note: error_policy already logs errors with warn!, so we only log success here
    let controller = Controller::new(restore_tests, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Ok(o) = res {
                info!("Reconciled: {:?}", o);
            }
            // Errors are logged in error_policy, no duplicate logging
        });

    // Run controller until shutdown signal received
    tokio::select! {
        _ = controller => {
            info!("Controller stream ended");
        }
        signal = wait_for_signal() => {
            info!(signal = signal, "Initiating graceful shutdown");
            // Mark not ready so K8s stops sending traffic during shutdown
            readiness.set_not_ready();
        }
    }

    // Trigger shutdown for all components
    shutdown_controller.shutdown();

    info!("Stopping components...");
    health_handle.abort();

    info!("lazarus operator shut down gracefully");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
