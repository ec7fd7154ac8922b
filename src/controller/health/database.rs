//! Database health check: connects to the restored database, runs the
//! configured validation queries and checks each scalar result against its
//! expected range.

use super::{CheckResult, HealthCheck};
use crate::controller::secrets::SecretReader;
use crate::crd::restore_test::{DatabaseCheckSpec, ExpectedRange};
use anyhow::Context as _;
use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct DatabaseHealthCheck {
    name: String,
    spec: DatabaseCheckSpec,
    secrets: Arc<dyn SecretReader>,
    /// Fallback namespace for secretRef lookups: the test's target
    /// namespace, where restored secrets land.
    default_secret_namespace: String,
}

impl DatabaseHealthCheck {
    pub fn new(
        name: &str,
        spec: DatabaseCheckSpec,
        secrets: Arc<dyn SecretReader>,
        default_secret_namespace: &str,
    ) -> Self {
        DatabaseHealthCheck {
            name: name.to_string(),
            spec,
            secrets,
            default_secret_namespace: default_secret_namespace.to_string(),
        }
    }

    async fn resolve_connection(&self) -> anyhow::Result<Option<String>> {
        let Some(source) = &self.spec.connection else {
            return Ok(None);
        };

        if let Some(value) = &source.value {
            return Ok(Some(value.clone()));
        }

        if let Some(secret_ref) = &source.secret_ref {
            let namespace = secret_ref
                .namespace
                .as_deref()
                .unwrap_or(&self.default_secret_namespace);
            let value = self
                .secrets
                .read_key(&secret_ref.name, &secret_ref.key, namespace)
                .await
                .with_context(|| {
                    format!("reading secret {namespace}/{}", secret_ref.name)
                })?;
            return Ok(value);
        }

        Ok(None)
    }

    async fn check_postgres(&self, connection_string: &str) -> anyhow::Result<CheckResult> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(connection_string)
            .await
            .context("connecting to postgres")?;

        let mut summaries = Vec::new();
        for query in &self.spec.queries {
            let row = sqlx::query(&query.sql)
                .fetch_one(&pool)
                .await
                .with_context(|| format!("query {}", query.name))?;
            let value: f64 = match row.try_get::<i64, _>(0) {
                Ok(v) => v as f64,
                Err(_) => row
                    .try_get::<f64, _>(0)
                    .with_context(|| format!("query {} returned a non-numeric result", query.name))?,
            };
            debug!(query = %query.name, value, "Query result");

            if let Some(range) = &query.expected_range {
                if !in_range(range, value) {
                    return Ok(CheckResult::failed(
                        &self.name,
                        format!(
                            "query {}: value {} not in range {}",
                            query.name,
                            value,
                            format_range(range)
                        ),
                    ));
                }
            }
            summaries.push(format!("{}={}", query.name, value));
        }
        pool.close().await;

        Ok(CheckResult::passed(
            &self.name,
            format!(
                "all {} queries passed: {}",
                self.spec.queries.len(),
                summaries.join(", ")
            ),
        ))
    }

    async fn check_mysql(&self, connection_string: &str) -> anyhow::Result<CheckResult> {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect(connection_string)
            .await
            .context("connecting to mysql")?;

        let mut summaries = Vec::new();
        for query in &self.spec.queries {
            let row = sqlx::query(&query.sql)
                .fetch_one(&pool)
                .await
                .with_context(|| format!("query {}", query.name))?;
            let value: f64 = match row.try_get::<i64, _>(0) {
                Ok(v) => v as f64,
                Err(_) => row
                    .try_get::<f64, _>(0)
                    .with_context(|| format!("query {} returned a non-numeric result", query.name))?,
            };
            debug!(query = %query.name, value, "Query result");

            if let Some(range) = &query.expected_range {
                if !in_range(range, value) {
                    return Ok(CheckResult::failed(
                        &self.name,
                        format!(
                            "query {}: value {} not in range {}",
                            query.name,
                            value,
                            format_range(range)
                        ),
                    ));
                }
            }
            summaries.push(format!("{}={}", query.name, value));
        }
        pool.close().await;

        Ok(CheckResult::passed(
            &self.name,
            format!(
                "all {} queries passed: {}",
                self.spec.queries.len(),
                summaries.join(", ")
            ),
        ))
    }
}

fn in_range(range: &ExpectedRange, value: f64) -> bool {
    range.min.map_or(true, |min| value >= min) && range.max.map_or(true, |max| value <= max)
}

fn format_range(range: &ExpectedRange) -> String {
    format!(
        "[{}, {}]",
        range.min.map_or("-inf".to_string(), |v| v.to_string()),
        range.max.map_or("inf".to_string(), |v| v.to_string())
    )
}

#[async_trait]
impl HealthCheck for DatabaseHealthCheck {
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
        let Some(connection_string) = self.resolve_connection().await? else {
            return Ok(CheckResult::error(
                &self.name,
                "no connection string configured",
            ));
        };

        match self.spec.kind.as_str() {
            "postgres" => self.check_postgres(&connection_string).await,
            "mysql" => self.check_mysql(&connection_string).await,
            other => Ok(CheckResult::error(
                &self.name,
                format!("unsupported database type: {other}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::health::CheckStatus;
    use crate::controller::secrets::MockSecretReader;
    use crate::crd::restore_test::{ConnectionSource, SecretKeyRef};

    fn spec_with_kind(kind: &str) -> DatabaseCheckSpec {
        DatabaseCheckSpec {
            enabled: true,
            kind: kind.to_string(),
            connection: Some(ConnectionSource {
                value: Some("postgres://user:pw@localhost/db".to_string()),
                secret_ref: None,
            }),
            queries: Vec::new(),
            timeout_seconds: 30,
            retries: 3,
        }
    }

    #[tokio::test]
    async fn unsupported_kind_is_an_error_not_a_failure() {
        let check = DatabaseHealthCheck::new(
            "database-health",
            spec_with_kind("mongodb"),
            Arc::new(MockSecretReader::new()),
            "default",
        );
        let result = check.attempt().await.unwrap();
        assert_eq!(result.status, CheckStatus::Error);
        assert!(result.message.contains("unsupported database type: mongodb"));
    }

    #[tokio::test]
    async fn missing_connection_is_an_error() {
        let mut spec = spec_with_kind("postgres");
        spec.connection = None;
        let check = DatabaseHealthCheck::new(
            "database-health",
            spec,
            Arc::new(MockSecretReader::new()),
            "default",
        );
        let result = check.attempt().await.unwrap();
        assert_eq!(result.status, CheckStatus::Error);
        assert!(result.message.contains("no connection string configured"));
    }

    #[tokio::test]
    async fn secret_ref_resolves_through_reader() {
        let secrets = MockSecretReader::new().with_value(
            "lazarus-test-b-1",
            "db-credentials",
            "url",
            "postgres://restored",
        );
        let mut spec = spec_with_kind("postgres");
        spec.connection = Some(ConnectionSource {
            value: None,
            secret_ref: Some(SecretKeyRef {
                name: "db-credentials".to_string(),
                key: "url".to_string(),
                namespace: None,
            }),
        });

        let check = DatabaseHealthCheck::new(
            "database-health",
            spec,
            Arc::new(secrets),
            "lazarus-test-b-1",
        );
        let resolved = check.resolve_connection().await.unwrap();
        assert_eq!(resolved.as_deref(), Some("postgres://restored"));
    }

    #[test]
    fn range_bounds_are_inclusive_and_optional() {
        let range = ExpectedRange {
            min: Some(1.0),
            max: Some(10.0),
        };
        assert!(in_range(&range, 1.0));
        assert!(in_range(&range, 10.0));
        assert!(!in_range(&range, 0.5));
        assert!(!in_range(&range, 10.5));

        let open_max = ExpectedRange {
            min: Some(0.0),
            max: None,
        };
        assert!(in_range(&open_max, 1e12));

        assert_eq!(format_range(&open_max), "[0, inf]");
    }
}
