use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::{payment_statuses::PaymentStatus, plan_kinds::PlanKind},
    infra::db::postgres::schema::payments,
};

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub plan_kind: String,
    pub provider_payment_id: String,
    pub amount_kopecks: i32,
    pub status: String,
    pub confirmation_url: Option<String>,
    /// Extends the buyer's live subscription of the same plan instead of
    /// starting the new window today.
    pub renewal: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentEntity {
    /// Unknown stored values are treated as still pending so they can be settled.
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_str(&self.status).unwrap_or(PaymentStatus::Pending)
    }

    pub fn plan_kind(&self) -> Option<PlanKind> {
        PlanKind::from_str(&self.plan_kind)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = payments)]
pub struct InsertPaymentEntity {
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub plan_kind: String,
    pub provider_payment_id: String,
    pub amount_kopecks: i32,
    pub status: String,
    pub confirmation_url: Option<String>,
    pub renewal: bool,
}
