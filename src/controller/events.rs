//! Kubernetes event emission for run milestones.
//!
//! Events are fire-and-forget: delivery failures are logged and swallowed,
//! never allowed to fail or block the run.

use crate::controller::clock::Clock;
use crate::crd::restore_test::RestoreTest;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::{Client, Resource, ResourceExt};
use std::sync::Arc;
use tracing::debug;

/// Sink for run-milestone events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event about `test`. `warning` selects the event type.
    async fn publish(&self, test: &RestoreTest, reason: &str, message: &str, warning: bool);
}

pub struct KubeEventPublisher {
    client: Client,
    clock: Arc<dyn Clock>,
}

impl KubeEventPublisher {
    pub fn new(client: Client, clock: Arc<dyn Clock>) -> Self {
        KubeEventPublisher { client, clock }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, test: &RestoreTest, reason: &str, message: &str, warning: bool) {
        let Some(namespace) = test.namespace() else {
            return;
        };
        let name = test.name_any();
        let now = self.clock.now();
        let timestamp = Time(now);

        let event = Event {
            metadata: ObjectMeta {
                name: Some(format!("{}.{:x}", name, now.timestamp_micros())),
                namespace: Some(namespace.clone()),
                ..Default::default()
            },
            type_: Some(if warning { "Warning" } else { "Normal" }.to_string()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            first_timestamp: Some(timestamp.clone()),
            last_timestamp: Some(timestamp),
            count: Some(1),
            source: Some(EventSource {
                component: Some("lazarus-operator".to_string()),
                ..Default::default()
            }),
            involved_object: ObjectReference {
                kind: Some(RestoreTest::kind(&()).to_string()),
                api_version: Some(RestoreTest::api_version(&()).to_string()),
                namespace: Some(namespace.clone()),
                name: Some(name.clone()),
                uid: test.meta().uid.clone(),
                ..Default::default()
            },
            ..Default::default()
        };

        let api: Api<Event> = Api::namespaced(self.client.clone(), &namespace);
        if let Err(e) = api.create(&PostParams::default(), &event).await {
            debug!(error = %e, test = %name, reason = %reason, "Failed to publish event (ignored)");
        }
    }
}

/// Records events in memory for assertions.
#[cfg(test)]
pub struct MockEventPublisher {
    events: std::sync::Mutex<Vec<(String, String, bool)>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockEventPublisher {
    pub fn new() -> Self {
        MockEventPublisher {
            events: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// (reason, message, warning) triples in publication order.
    pub fn published(&self) -> Vec<(String, String, bool)> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.published().into_iter().map(|(r, _, _)| r).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish(&self, _test: &RestoreTest, reason: &str, message: &str, warning: bool) {
        self.events
            .lock()
            .unwrap()
            .push((reason.to_string(), message.to_string(), warning));
    }
}
