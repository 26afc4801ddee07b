use axum::http::StatusCode;
use jurist_core::domain::value_objects::{enums::action_kinds::ActionKind, plans::Quota};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("conflicting state: {0}")]
    Conflict(String),
    #[error("{action} quota exhausted ({used} used)")]
    QuotaExceeded {
        action: ActionKind,
        used: i64,
        limit: Quota,
    },
    #[error("no active subscription")]
    NoActiveSubscription,
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    TransientInfra(#[from] anyhow::Error),
}

impl BillingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BillingError::Validation(_) => StatusCode::BAD_REQUEST,
            BillingError::Conflict(_) => StatusCode::CONFLICT,
            BillingError::QuotaExceeded { .. } | BillingError::NoActiveSubscription => {
                StatusCode::FORBIDDEN
            }
            BillingError::NotFound(_) => StatusCode::NOT_FOUND,
            BillingError::TransientInfra(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::Validation(_) => "validation_error",
            BillingError::Conflict(_) => "conflict",
            BillingError::QuotaExceeded { .. } => "quota_exceeded",
            BillingError::NoActiveSubscription => "no_active_subscription",
            BillingError::NotFound(_) => "not_found",
            BillingError::TransientInfra(_) => "internal_error",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, BillingError>;
