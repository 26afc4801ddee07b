use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::usecases::errors::BillingError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = self.code();

        let (message, details) = match &self {
            BillingError::TransientInfra(err) => {
                // Don't leak internal error detail to client
                error!(error = ?err, "http: request failed on infrastructure error");
                ("Internal server error".to_string(), None)
            }
            BillingError::QuotaExceeded {
                action,
                used,
                limit,
            } => (
                "Лимит по вашему тарифу исчерпан. Оформите подписку выше уровнем или дождитесь нового периода."
                    .to_string(),
                Some(json!({ "action": action, "used": used, "limit": limit.as_raw() })),
            ),
            BillingError::NoActiveSubscription => (
                "Нет активной подписки. Оформите подписку или пробный период.".to_string(),
                None,
            ),
            other => (other.to_string(), None),
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            error,
            message,
            details,
        });

        (status, body).into_response()
    }
}

pub fn bad_request(message: impl Into<String>) -> Response {
    BillingError::Validation(message.into()).into_response()
}
