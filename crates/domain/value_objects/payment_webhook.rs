use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::value_objects::enums::payment_statuses::PaymentStatus;

/// Notification body as posted by the payment provider.
///
/// Every field is optional on purpose: structural validation happens in the
/// reconciler so a malformed body turns into a typed validation error instead
/// of a framework rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentWebhookNotification {
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub event: Option<String>,
    pub object: Option<PaymentWebhookObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentWebhookObject {
    pub id: Option<String>,
    pub status: Option<String>,
    pub amount: Option<ProviderAmount>,
    /// Set on refund objects: the payment the refund belongs to.
    pub payment_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub cancellation_details: Option<CancellationDetails>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProviderAmount {
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CancellationDetails {
    pub party: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEventKind {
    PaymentSucceeded,
    PaymentCanceled,
    PaymentWaitingForCapture,
    RefundSucceeded,
    Other(String),
}

impl PaymentEventKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "payment.succeeded" => PaymentEventKind::PaymentSucceeded,
            "payment.canceled" => PaymentEventKind::PaymentCanceled,
            "payment.waiting_for_capture" => PaymentEventKind::PaymentWaitingForCapture,
            "refund.succeeded" => PaymentEventKind::RefundSucceeded,
            other => PaymentEventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentEventKind::PaymentSucceeded => "payment.succeeded",
            PaymentEventKind::PaymentCanceled => "payment.canceled",
            PaymentEventKind::PaymentWaitingForCapture => "payment.waiting_for_capture",
            PaymentEventKind::RefundSucceeded => "refund.succeeded",
            PaymentEventKind::Other(raw) => raw.as_str(),
        }
    }
}

/// Decline reasons the provider reports for a payment the payer could not
/// complete. Anything else (merchant cancel, confirmation timeout) is a plain
/// cancellation.
const FAILURE_REASONS: &[&str] = &[
    "3d_secure_failed",
    "call_issuer",
    "card_expired",
    "country_forbidden",
    "fraud_suspected",
    "general_decline",
    "identification_required",
    "insufficient_funds",
    "invalid_card_number",
    "invalid_csc",
    "issuer_unavailable",
    "payment_method_limit_exceeded",
    "payment_method_restricted",
];

impl PaymentWebhookObject {
    pub fn metadata_string(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            serde_json::Value::String(value) => {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            serde_json::Value::Number(value) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn telegram_id(&self) -> Option<i64> {
        self.metadata_string("telegram_id")?.parse().ok()
    }

    /// Terminal status a `payment.canceled` notification moves the payment to.
    pub fn cancellation_status(&self) -> PaymentStatus {
        let reason = self
            .cancellation_details
            .as_ref()
            .and_then(|details| details.reason.as_deref());

        match reason {
            Some(reason) if FAILURE_REASONS.contains(&reason) => PaymentStatus::Failed,
            _ => PaymentStatus::Cancelled,
        }
    }

    pub fn amount_kopecks(&self) -> Option<i32> {
        self.amount.as_ref().and_then(ProviderAmount::to_minor_units)
    }
}

impl ProviderAmount {
    /// Parses a decimal string such as `"790.00"` into minor units (kopecks).
    pub fn to_minor_units(&self) -> Option<i32> {
        let value = self.value.trim();
        let (whole, fraction) = match value.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (value, ""),
        };

        if whole.is_empty() || fraction.len() > 2 {
            return None;
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        let whole: i32 = whole.parse().ok()?;
        let fraction: i32 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i32>().ok()? * 10,
            _ => fraction.parse().ok()?,
        };

        whole.checked_mul(100)?.checked_add(fraction)
    }

    pub fn from_minor_units(kopecks: i32, currency: &str) -> Self {
        Self {
            value: format!("{}.{:02}", kopecks / 100, kopecks % 100),
            currency: currency.to_string(),
        }
    }
}
