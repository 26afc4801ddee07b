use std::{collections::HashMap, time::Duration};

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        enums::plan_kinds::PlanKind,
        payment_webhook::{CancellationDetails, PaymentWebhookObject, ProviderAmount},
    },
    infra::http::retry::{RetryPolicy, is_transient, retry_with_backoff},
};

pub const DEFAULT_YOOKASSA_API_BASE: &str = "https://api.yookassa.ru/v3";
pub const PAYMENT_CURRENCY: &str = "RUB";

/// REST client for the YooKassa payments API (HTTP basic auth with shop id
/// and secret key).
#[derive(Clone)]
pub struct YooKassaClient {
    http: Client,
    api_base: String,
    shop_id: String,
    secret_key: String,
    return_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatePaymentRequest {
    pub telegram_id: i64,
    pub plan_kind: PlanKind,
    pub plan_title: String,
    pub amount_kopecks: i32,
    pub renewal: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderPayment {
    pub id: String,
    pub status: String,
    pub amount: Option<ProviderAmount>,
    pub confirmation: Option<PaymentConfirmation>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub cancellation_details: Option<CancellationDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfirmation {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub confirmation_url: Option<String>,
}

impl ProviderPayment {
    pub fn confirmation_url(&self) -> Option<&str> {
        self.confirmation
            .as_ref()
            .and_then(|confirmation| confirmation.confirmation_url.as_deref())
    }
}

/// A polled payment carries the same fields a notification object does.
impl From<ProviderPayment> for PaymentWebhookObject {
    fn from(payment: ProviderPayment) -> Self {
        Self {
            id: Some(payment.id),
            status: Some(payment.status),
            amount: payment.amount,
            payment_id: None,
            metadata: payment.metadata,
            cancellation_details: payment.cancellation_details,
        }
    }
}

#[derive(Debug, Deserialize)]
struct YooKassaErrorEnvelope {
    id: Option<String>,
    code: Option<String>,
    description: Option<String>,
    parameter: Option<String>,
}

#[derive(Debug, Serialize)]
struct PaymentBody {
    amount: ProviderAmountBody,
    capture: bool,
    confirmation: serde_json::Value,
    description: String,
    metadata: HashMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
struct ProviderAmountBody {
    value: String,
    currency: &'static str,
}

impl YooKassaClient {
    pub fn new(
        shop_id: String,
        secret_key: String,
        api_base: &str,
        return_url: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build yookassa http client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            shop_id,
            secret_key,
            return_url,
            retry,
        })
    }

    /// Sends the request, retrying connection failures, timeouts and 5xx/429.
    /// Any other non-success status is returned for `ensure_success`.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let build = &build;
        retry_with_backoff(&self.retry, is_transient, move || async move {
            let response = build().send().await?;
            let status = response.status();
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return response.error_for_status();
            }
            Ok(response)
        })
        .await
        .map_err(|error| anyhow!("yookassa request failed: {error}"))
    }

    async fn ensure_success(response: Response, operation: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let envelope = serde_json::from_str::<YooKassaErrorEnvelope>(&body).ok();

        error!(
            status = %status,
            operation,
            yookassa_request_id = ?envelope.as_ref().and_then(|e| e.id.clone()),
            yookassa_error_code = ?envelope.as_ref().and_then(|e| e.code.clone()),
            yookassa_error_parameter = ?envelope.as_ref().and_then(|e| e.parameter.clone()),
            yookassa_error_description = ?envelope.as_ref().and_then(|e| e.description.clone()),
            "yookassa: api request rejected"
        );

        Err(anyhow!("yookassa {operation} failed with status {status}"))
    }

    fn payment_body(&self, request: &CreatePaymentRequest, idempotence_key: &str) -> PaymentBody {
        let key_prefix: String = idempotence_key.chars().take(8).collect();
        let plan = request.plan_kind.as_str();

        let mut metadata = HashMap::from([
            ("telegram_id", request.telegram_id.to_string()),
            ("subscription_type", plan.to_string()),
            (
                "order_id",
                format!("sub_{}_{}_{}", request.telegram_id, plan, key_prefix),
            ),
        ]);
        let description = if request.renewal {
            metadata.insert("renewal", "true".to_string());
            format!("Продление: {} - 1 месяц", request.plan_title)
        } else {
            format!("{} - 1 месяц", request.plan_title)
        };

        PaymentBody {
            amount: ProviderAmountBody {
                value: ProviderAmount::from_minor_units(request.amount_kopecks, PAYMENT_CURRENCY).value,
                currency: PAYMENT_CURRENCY,
            },
            capture: true,
            confirmation: json!({ "type": "redirect", "return_url": self.return_url }),
            description,
            metadata,
        }
    }

    /// Creates a payment with automatic capture and a redirect confirmation.
    /// One idempotence key is shared by every retry of the same call.
    pub async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<ProviderPayment> {
        let idempotence_key = Uuid::new_v4().to_string();
        let body = self.payment_body(request, &idempotence_key);
        let url = format!("{}/payments", self.api_base);

        let response = self
            .send_with_retry(|| {
                self.http
                    .post(&url)
                    .basic_auth(&self.shop_id, Some(&self.secret_key))
                    .header("Idempotence-Key", &idempotence_key)
                    .json(&body)
            })
            .await?;
        let response = Self::ensure_success(response, "create payment").await?;
        let payment: ProviderPayment = response
            .json()
            .await
            .context("yookassa create payment returned an unreadable body")?;

        info!(
            provider_payment_id = %payment.id,
            telegram_id = request.telegram_id,
            plan_kind = %request.plan_kind,
            "yookassa: payment created"
        );

        Ok(payment)
    }

    pub async fn get_payment(&self, provider_payment_id: &str) -> Result<ProviderPayment> {
        let url = format!("{}/payments/{}", self.api_base, provider_payment_id);

        let response = self
            .send_with_retry(|| {
                self.http
                    .get(&url)
                    .basic_auth(&self.shop_id, Some(&self.secret_key))
            })
            .await?;
        let response = Self::ensure_success(response, "get payment").await?;

        response
            .json()
            .await
            .context("yookassa get payment returned an unreadable body")
    }

    /// Cheap authenticated call used by health checks.
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/me", self.api_base);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .send()
            .await
            .map_err(|error| anyhow!("yookassa ping failed: {error}"))?;
        Self::ensure_success(response, "ping").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> YooKassaClient {
        YooKassaClient::new(
            "shop".to_string(),
            "secret".to_string(),
            DEFAULT_YOOKASSA_API_BASE,
            "https://t.me/AIlawer_bot".to_string(),
            Duration::from_secs(5),
            RetryPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn payment_body_carries_bot_metadata() {
        let request = CreatePaymentRequest {
            telegram_id: 123456789,
            plan_kind: PlanKind::Basic,
            plan_title: "AI-Юрист Базовый".to_string(),
            amount_kopecks: 79000,
            renewal: false,
        };

        let body = serde_json::to_value(client().payment_body(&request, "1a2b3c4d-0000")).unwrap();

        assert_eq!(body["amount"]["value"], "790.00");
        assert_eq!(body["amount"]["currency"], "RUB");
        assert_eq!(body["capture"], true);
        assert_eq!(body["confirmation"]["return_url"], "https://t.me/AIlawer_bot");
        assert_eq!(body["description"], "AI-Юрист Базовый - 1 месяц");
        assert_eq!(body["metadata"]["telegram_id"], "123456789");
        assert_eq!(body["metadata"]["subscription_type"], "basic");
        assert_eq!(body["metadata"]["order_id"], "sub_123456789_basic_1a2b3c4d");
        assert!(body["metadata"].get("renewal").is_none());
    }

    #[test]
    fn renewal_payment_is_flagged_in_metadata() {
        let request = CreatePaymentRequest {
            telegram_id: 123456789,
            plan_kind: PlanKind::Premium,
            plan_title: "AI-Юрист Премиум".to_string(),
            amount_kopecks: 149000,
            renewal: true,
        };

        let body = serde_json::to_value(client().payment_body(&request, "9f8e7d6c-0000")).unwrap();

        assert_eq!(body["metadata"]["renewal"], "true");
        assert_eq!(body["description"], "Продление: AI-Юрист Премиум - 1 месяц");
    }

    #[test]
    fn polled_payment_reads_like_a_notification_object() {
        let payment: ProviderPayment = serde_json::from_str(
            r#"{
                "id": "pay-7",
                "status": "canceled",
                "metadata": {"telegram_id": "77", "subscription_type": "basic"},
                "cancellation_details": {"party": "payment_network", "reason": "card_expired"}
            }"#,
        )
        .unwrap();

        let object = PaymentWebhookObject::from(payment);
        assert_eq!(object.id.as_deref(), Some("pay-7"));
        assert_eq!(object.telegram_id(), Some(77));
        assert_eq!(
            object.cancellation_status(),
            crate::domain::value_objects::enums::payment_statuses::PaymentStatus::Failed
        );
    }

    #[test]
    fn provider_payment_exposes_confirmation_url() {
        let payment: ProviderPayment = serde_json::from_str(
            r#"{
                "id": "2f8b6c3e-000f-5000-9000-1b2c3d4e5f60",
                "status": "pending",
                "amount": {"value": "1490.00", "currency": "RUB"},
                "confirmation": {"type": "redirect", "confirmation_url": "https://yoomoney.ru/checkout/payments/v2/contract?orderId=1"},
                "metadata": {"telegram_id": "1", "subscription_type": "premium"}
            }"#,
        )
        .unwrap();

        assert_eq!(
            payment.confirmation_url(),
            Some("https://yoomoney.ru/checkout/payments/v2/contract?orderId=1")
        );
        assert_eq!(payment.amount.unwrap().to_minor_units(), Some(149000));
    }
}
