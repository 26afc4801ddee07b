use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jurist_core::{
    infra::db::postgres::postgres_connection::{self, PgPoolSquad},
    llm::gigachat_client::GigaChatClient,
    payments::yookassa_client::YooKassaClient,
};
use serde::Serialize;
use tokio::{task::JoinSet, time::Instant};
use tracing::warn;

pub const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// One dependency the service needs to do useful work.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self) -> AnyResult<()>;
}

pub struct DatabaseCheck {
    db_pool: Arc<PgPoolSquad>,
}

impl DatabaseCheck {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl HealthCheck for DatabaseCheck {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn check(&self) -> AnyResult<()> {
        postgres_connection::ping(Arc::clone(&self.db_pool)).await
    }
}

pub struct PaymentGatewayCheck {
    client: Arc<YooKassaClient>,
}

impl PaymentGatewayCheck {
    pub fn new(client: Arc<YooKassaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthCheck for PaymentGatewayCheck {
    fn name(&self) -> &'static str {
        "payment_gateway"
    }

    async fn check(&self) -> AnyResult<()> {
        self.client.ping().await
    }
}

pub struct LlmCheck {
    client: Arc<GigaChatClient>,
}

impl LlmCheck {
    pub fn new(client: Arc<GigaChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthCheck for LlmCheck {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn check(&self) -> AnyResult<()> {
        self.client.ping().await
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckReport {
    pub status: CheckStatus,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<String, CheckReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub service: String,
    pub version: String,
    pub description: &'static str,
    pub endpoints: Vec<&'static str>,
}

pub const ENDPOINTS: &[&str] = &[
    "POST /webhook/yookassa",
    "POST /webhook/ai-lawyer",
    "GET /health",
    "GET /status",
    "GET /api/v1/subscriptions/plans",
    "GET /api/v1/subscriptions/current",
    "POST /api/v1/subscriptions/trial",
    "POST /api/v1/subscriptions/checkout",
    "POST /api/v1/subscriptions/checkout/{payment_id}/sync",
    "POST /api/v1/subscriptions/cancel",
    "GET /api/v1/usage/stats",
    "POST /api/v1/usage/{action}",
    "POST /api/v1/consultations",
];

pub struct HealthUseCase {
    checks: Vec<Arc<dyn HealthCheck>>,
    check_timeout: Duration,
    service: String,
    version: String,
}

impl HealthUseCase {
    pub fn new(checks: Vec<Arc<dyn HealthCheck>>, service: String, version: String) -> Self {
        Self {
            checks,
            check_timeout: CHECK_TIMEOUT,
            service,
            version,
        }
    }

    pub fn with_check_timeout(mut self, check_timeout: Duration) -> Self {
        self.check_timeout = check_timeout;
        self
    }

    /// Runs every check concurrently, each bounded by the check timeout.
    pub async fn report(&self) -> HealthReport {
        let mut set = JoinSet::new();
        for check in &self.checks {
            let check = Arc::clone(check);
            let check_timeout = self.check_timeout;
            set.spawn(async move {
                let started = Instant::now();
                let status = match tokio::time::timeout(check_timeout, check.check()).await {
                    Ok(Ok(())) => CheckStatus::Ok,
                    Ok(Err(err)) => {
                        warn!(check = check.name(), error = ?err, "health: check failed");
                        CheckStatus::Error
                    }
                    Err(_) => {
                        warn!(
                            check = check.name(),
                            timeout_ms = check_timeout.as_millis() as u64,
                            "health: check timed out"
                        );
                        CheckStatus::Timeout
                    }
                };
                let latency_ms = started.elapsed().as_millis() as u64;
                (check.name(), CheckReport { status, latency_ms })
            });
        }

        let mut checks = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, report)) => {
                    checks.insert(name.to_string(), report);
                }
                Err(err) => warn!(error = ?err, "health: check task panicked"),
            }
        }

        let all_ok = checks.len() == self.checks.len()
            && checks.values().all(|check| check.status == CheckStatus::Ok);

        HealthReport {
            status: if all_ok {
                OverallStatus::Ok
            } else {
                OverallStatus::Degraded
            },
            service: self.service.clone(),
            version: self.version.clone(),
            timestamp: Utc::now(),
            checks,
        }
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            service: self.service.clone(),
            version: self.version.clone(),
            description: "Subscription, usage and payment accounting for the legal consultation bot",
            endpoints: ENDPOINTS.to_vec(),
        }
    }
}
