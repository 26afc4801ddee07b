use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::{plan_kinds::PlanKind, subscription_statuses::SubscriptionStatus},
    plans::Quota,
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscriptionStatusDto {
    pub has_subscription: bool,
    pub subscription_id: Option<Uuid>,
    pub plan_kind: Option<PlanKind>,
    pub status: Option<SubscriptionStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub trial_used: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ActionUsage {
    pub used: i64,
    pub limit: Quota,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageStatsDto {
    pub plan_kind: PlanKind,
    pub expires_at: DateTime<Utc>,
    pub consultations: ActionUsage,
    pub documents: ActionUsage,
    pub analyses: ActionUsage,
}

/// Per-action event counts inside one billing period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounts {
    pub consultations: i64,
    pub documents: i64,
    pub analyses: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutLinkDto {
    pub provider_payment_id: String,
    pub confirmation_url: String,
    pub plan_kind: PlanKind,
    pub amount_kopecks: i32,
    pub renewal: bool,
}
