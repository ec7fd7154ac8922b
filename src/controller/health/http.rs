//! HTTP health check: probes configured endpoints of the restored workload
//! for expected status codes and body content.
//!
//! Transport failures are expected operational failures (the restored
//! service may simply not be serving), so they yield `Failed` rather than
//! `Error`.

use super::{CheckResult, HealthCheck};
use crate::crd::restore_test::HttpCheckSpec;
use async_trait::async_trait;
use std::time::Duration;

pub struct HttpHealthCheck {
    name: String,
    spec: HttpCheckSpec,
    client: reqwest::Client,
}

impl HttpHealthCheck {
    pub fn new(name: &str, spec: HttpCheckSpec, client: reqwest::Client) -> Self {
        HttpHealthCheck {
            name: name.to_string(),
            spec,
            client,
        }
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.spec.timeout_seconds)
    }

    fn retries(&self) -> u32 {
        self.spec.retries
    }

    async fn attempt(&self) -> anyhow::Result<CheckResult> {
        let mut summaries = Vec::new();

        for endpoint in &self.spec.endpoints {
            let response = match self.client.get(&endpoint.url).send().await {
                Ok(r) => r,
                Err(e) => {
                    return Ok(CheckResult::failed(
                        &self.name,
                        format!("endpoint {}: request failed: {e}", endpoint.name),
                    ));
                }
            };

            let status = response.status().as_u16();
            if status != endpoint.expected_status {
                return Ok(CheckResult::failed(
                    &self.name,
                    format!(
                        "endpoint {}: expected status {}, got {}",
                        endpoint.name, endpoint.expected_status, status
                    ),
                ));
            }

            if let Some(needle) = &endpoint.body_contains {
                let body = match response.text().await {
                    Ok(b) => b,
                    Err(e) => {
                        return Ok(CheckResult::failed(
                            &self.name,
                            format!("endpoint {}: failed to read body: {e}", endpoint.name),
                        ));
                    }
                };
                if !body.contains(needle) {
                    return Ok(CheckResult::failed(
                        &self.name,
                        format!(
                            "endpoint {}: response body does not contain {needle:?}",
                            endpoint.name
                        ),
                    ));
                }
            }

            summaries.push(format!("{}=OK", endpoint.name));
        }

        Ok(CheckResult::passed(
            &self.name,
            format!(
                "all {} endpoints passed: {}",
                self.spec.endpoints.len(),
                summaries.join(", ")
            ),
        ))
    }
}
