use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::usage_log;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = usage_log)]
pub struct UsageEventEntity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub action_type: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = usage_log)]
pub struct InsertUsageEventEntity {
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub action_type: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
