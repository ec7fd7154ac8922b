//! Reconciliation wrapper around the restore-test state machine: finalizer
//! bookkeeping, terminal-status guard, status patching and requeue policy.

use super::run::run_restore_test;
use crate::config::OperatorConfig;
use crate::controller::clock::Clock;
use crate::controller::events::EventPublisher;
use crate::controller::namespace::NamespaceManager;
use crate::controller::notify::Notifier;
use crate::controller::rpo::RpoEstimator;
use crate::controller::secrets::SecretReader;
use crate::controller::velero::RestoreGateway;
use crate::crd::restore_test::{RestoreTest, TestPhase};
use crate::server::SharedMetrics;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const FINALIZER: &str = "lazarus.io/finalizer";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("RestoreTest missing namespace")]
    MissingNamespace,
}

/// Controller context: every collaborator the state machine needs,
/// constructed once at process start and injected so tests can substitute
/// fakes.
pub struct Context {
    pub client: kube::Client,
    pub config: OperatorConfig,
    pub velero: RestoreGateway,
    pub namespaces: Arc<dyn NamespaceManager>,
    pub secrets: Arc<dyn SecretReader>,
    pub events: Arc<dyn EventPublisher>,
    pub notifier: Arc<dyn Notifier>,
    pub rpo: Arc<dyn RpoEstimator>,
    pub clock: Arc<dyn Clock>,
    pub http_client: reqwest::Client,
    /// When Some, run and check outcomes are recorded for Prometheus.
    pub metrics: Option<SharedMetrics>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: kube::Client,
        config: OperatorConfig,
        velero: RestoreGateway,
        namespaces: Arc<dyn NamespaceManager>,
        secrets: Arc<dyn SecretReader>,
        events: Arc<dyn EventPublisher>,
        notifier: Arc<dyn Notifier>,
        rpo: Arc<dyn RpoEstimator>,
        clock: Arc<dyn Clock>,
        metrics: Option<SharedMetrics>,
    ) -> Self {
        Context {
            client,
            config,
            velero,
            namespaces,
            secrets,
            events,
            notifier,
            rpo,
            clock,
            http_client: reqwest::Client::new(),
            metrics,
        }
    }

    /// Wire up the production collaborators against one cluster client.
    pub fn for_cluster(
        client: kube::Client,
        config: OperatorConfig,
        metrics: Option<SharedMetrics>,
    ) -> Self {
        use crate::controller::clock::SystemClock;
        use crate::controller::events::KubeEventPublisher;
        use crate::controller::namespace::KubeNamespaceManager;
        use crate::controller::notify::SlackNotifier;
        use crate::controller::rpo::ZeroRpo;
        use crate::controller::secrets::KubeSecretReader;
        use crate::controller::velero::KubeVeleroApi;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let velero = RestoreGateway::new(Arc::new(KubeVeleroApi::new(
            client.clone(),
            config.velero_namespace.clone(),
        )));
        let notifier = SlackNotifier::new(config.slack_webhook_url.clone());

        Context::new(
            client.clone(),
            config,
            velero,
            Arc::new(KubeNamespaceManager::new(client.clone())),
            Arc::new(KubeSecretReader::new(client.clone())),
            Arc::new(KubeEventPublisher::new(client, clock.clone())),
            Arc::new(notifier),
            Arc::new(ZeroRpo),
            clock,
            metrics,
        )
    }
}

fn has_finalizer(rt: &RestoreTest) -> bool {
    rt.meta()
        .finalizers
        .as_ref()
        .map(|f| f.iter().any(|x| x == FINALIZER))
        .unwrap_or(false)
}

/// Reconcile one RestoreTest.
///
/// A resource without terminal status gets one full run; terminal statuses
/// park the resource until it changes. Deletion triggers best-effort
/// teardown before the finalizer is released.
pub async fn reconcile(rt: Arc<RestoreTest>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let namespace = rt.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let name = rt.name_any();
    let api: Api<RestoreTest> = Api::namespaced(ctx.client.clone(), &namespace);

    if rt.meta().deletion_timestamp.is_some() {
        info!(test = %name, "Deletion requested; tearing down test resources");
        teardown(&rt, &ctx).await;

        if has_finalizer(&rt) {
            let finalizers: Vec<String> = rt
                .meta()
                .finalizers
                .clone()
                .unwrap_or_default()
                .into_iter()
                .filter(|f| f != FINALIZER)
                .collect();
            api.patch(
                &name,
                &PatchParams::default(),
                &Patch::Merge(&json!({ "metadata": { "finalizers": finalizers } })),
            )
            .await?;
        }
        return Ok(Action::await_change());
    }

    if !has_finalizer(&rt) {
        let mut finalizers = rt.meta().finalizers.clone().unwrap_or_default();
        finalizers.push(FINALIZER.to_string());
        api.patch(
            &name,
            &PatchParams::default(),
            &Patch::Merge(&json!({ "metadata": { "finalizers": finalizers } })),
        )
        .await?;
    }

    // Terminal statuses park the resource. Only a failure explicitly marked
    // retryable gets a fresh attempt.
    if let Some(status) = &rt.status {
        match status.phase {
            Some(TestPhase::Succeeded) => return Ok(Action::await_change()),
            Some(TestPhase::Failed) => {
                let retryable = status
                    .result
                    .as_ref()
                    .and_then(|r| r.retryable)
                    .unwrap_or(false);
                if !retryable {
                    return Ok(Action::await_change());
                }
                info!(test = %name, "Previous attempt failed retryably; starting a new attempt");
            }
            _ => {}
        }
    }

    info!(
        test = %name,
        namespace = %namespace,
        backup = %rt.spec.backup_name,
        "Reconciling RestoreTest"
    );

    let outcome = run_restore_test(&rt, &ctx).await;

    api.patch_status(
        &name,
        &PatchParams::default(),
        &Patch::Merge(&json!({ "status": outcome.status })),
    )
    .await?;

    match outcome.failure {
        None => Ok(Action::await_change()),
        Some(failure) if failure.is_permanent() => {
            warn!(test = %name, error = %failure, "Permanent failure; will not retry");
            Ok(Action::await_change())
        }
        Some(failure) => {
            warn!(
                test = %name,
                error = %failure,
                retry_secs = ctx.config.retry_delay.as_secs(),
                "Retryable failure; requeueing"
            );
            Ok(Action::requeue(ctx.config.retry_delay))
        }
    }
}

/// Best-effort teardown on deletion: the test namespace (resolved from
/// status, falling back to the spec) and the recorded restore.
async fn teardown(rt: &RestoreTest, ctx: &Context) {
    let namespace = rt
        .status
        .as_ref()
        .and_then(|s| s.test_namespace.clone())
        .or_else(|| rt.spec.restore_namespace.clone());

    if let Some(namespace) = namespace {
        if let Err(e) = ctx.namespaces.delete(&namespace).await {
            warn!(error = %e, namespace = %namespace, "Failed to delete test namespace");
        }
    }

    if let Some(restore_name) = rt
        .status
        .as_ref()
        .and_then(|s| s.restore.as_ref())
        .and_then(|r| r.restore_name.as_deref())
    {
        ctx.velero.delete_restore(restore_name).await;
    }
}
