//! Slack webhook notifications for run outcomes.
//!
//! Delivery is best-effort: failures are logged and never escalated, so an
//! unreachable webhook can never mask a test verdict.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

/// Payload for a success notification.
#[derive(Debug, Clone)]
pub struct SuccessNote {
    pub test_name: String,
    pub backup_name: String,
    pub rto_seconds: i64,
    pub rpo_seconds: i64,
    pub resources_restored: i64,
    pub completed_at: String,
}

/// Payload for a failure notification.
#[derive(Debug, Clone)]
pub struct FailureNote {
    pub test_name: String,
    pub backup_name: String,
    pub error: String,
    pub completed_at: String,
    /// Slack handle to cc on the failure message.
    pub mention: Option<String>,
}

/// Sink for test-outcome notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_success(&self, note: &SuccessNote);
    async fn notify_failure(&self, note: &FailureNote);
}

/// Posts Slack block-kit payloads to a webhook URL. A missing URL disables
/// delivery entirely.
pub struct SlackNotifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        if webhook_url.is_some() {
            info!("Slack notifications enabled");
        }
        SlackNotifier {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, text: &str, payload: serde_json::Value) {
        let Some(url) = &self.webhook_url else {
            return;
        };

        let body = json!({ "text": text, "blocks": payload });
        if let Err(e) = self.client.post(url).json(&body).send().await {
            warn!(error = %e, "Failed to send Slack notification");
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify_success(&self, note: &SuccessNote) {
        let blocks = json!([
            {
                "type": "header",
                "text": { "type": "plain_text", "text": "Backup Restore Test Passed" }
            },
            {
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*Backup:*\n{}", note.backup_name) },
                    { "type": "mrkdwn", "text": format!("*Test:*\n{}", note.test_name) },
                    { "type": "mrkdwn", "text": format!("*RTO:*\n{}s", note.rto_seconds) },
                    { "type": "mrkdwn", "text": format!("*RPO:*\n{}s", note.rpo_seconds) },
                    { "type": "mrkdwn", "text": format!("*Resources Restored:*\n{}", note.resources_restored) }
                ]
            },
            {
                "type": "context",
                "elements": [
                    { "type": "mrkdwn", "text": format!("Backup recovery validated at {}", note.completed_at) }
                ]
            }
        ]);

        self.post(
            &format!("Backup restore test passed: {}", note.backup_name),
            blocks,
        )
        .await;
    }

    async fn notify_failure(&self, note: &FailureNote) {
        // Char-boundary safe truncation for the code block.
        let error: String = note.error.chars().take(500).collect();

        let mut blocks = vec![
            json!({
                "type": "header",
                "text": { "type": "plain_text", "text": "Backup Restore Test Failed" }
            }),
            json!({
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*Backup:*\n{}", note.backup_name) },
                    { "type": "mrkdwn", "text": format!("*Test:*\n{}", note.test_name) }
                ]
            }),
            json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("*Error:*\n```{}```", error) }
            }),
            json!({
                "type": "context",
                "elements": [
                    { "type": "mrkdwn", "text": format!("Backup recovery validation failed at {}. Investigate immediately!", note.completed_at) }
                ]
            }),
        ];

        if let Some(mention) = &note.mention {
            blocks.insert(
                1,
                json!({
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": format!("cc: {}", mention) }
                }),
            );
        }

        self.post(
            &format!("Backup restore test failed: {}", note.backup_name),
            serde_json::Value::Array(blocks),
        )
        .await;
    }
}

/// Records notifications in memory for assertions.
#[cfg(test)]
pub struct MockNotifier {
    successes: std::sync::Mutex<Vec<SuccessNote>>,
    failures: std::sync::Mutex<Vec<FailureNote>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockNotifier {
    pub fn new() -> Self {
        MockNotifier {
            successes: std::sync::Mutex::new(Vec::new()),
            failures: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn successes(&self) -> Vec<SuccessNote> {
        self.successes.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<FailureNote> {
        self.failures.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[async_trait]
impl Notifier for MockNotifier {
    async fn notify_success(&self, note: &SuccessNote) {
        self.successes.lock().unwrap().push(note.clone());
    }

    async fn notify_failure(&self, note: &FailureNote) {
        self.failures.lock().unwrap().push(note.clone());
    }
}
