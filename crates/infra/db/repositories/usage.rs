use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, dsl::count_star, insert_into, prelude::*};
use std::sync::Arc;
use tokio::task;
use tracing::warn;
use uuid::Uuid;

use crate::{
    domain::{
        entities::usage_log::InsertUsageEventEntity,
        repositories::usage::UsageRepository,
        value_objects::{
            enums::action_kinds::ActionKind, ledger::NewUsageEvent, subscriptions::UsageCounts,
        },
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::usage_log},
};

pub struct UsagePostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UsagePostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UsageRepository for UsagePostgres {
    async fn append(&self, event: NewUsageEvent) -> Result<Uuid> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Uuid> {
            let mut conn = db_pool.get()?;

            let id = insert_into(usage_log::table)
                .values(&InsertUsageEventEntity {
                    user_id: event.user_id,
                    subscription_id: event.subscription_id,
                    action_type: event.action.as_str().to_string(),
                    details: event.details,
                    created_at: event.recorded_at,
                })
                .returning(usage_log::id)
                .get_result::<Uuid>(&mut conn)?;

            Ok(id)
        })
        .await??)
    }

    async fn count_in_period(
        &self,
        user_id: Uuid,
        subscription_id: Uuid,
        action: ActionKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<i64> {
            let mut conn = db_pool.get()?;

            let count = usage_log::table
                .filter(usage_log::user_id.eq(user_id))
                .filter(usage_log::subscription_id.eq(subscription_id))
                .filter(usage_log::action_type.eq(action.as_str()))
                .filter(usage_log::created_at.ge(from))
                .filter(usage_log::created_at.lt(to))
                .count()
                .get_result::<i64>(&mut conn)?;

            Ok(count)
        })
        .await??)
    }

    async fn usage_breakdown(
        &self,
        user_id: Uuid,
        subscription_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<UsageCounts> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<UsageCounts> {
            let mut conn = db_pool.get()?;

            let rows = usage_log::table
                .filter(usage_log::user_id.eq(user_id))
                .filter(usage_log::subscription_id.eq(subscription_id))
                .filter(usage_log::created_at.ge(from))
                .filter(usage_log::created_at.lt(to))
                .group_by(usage_log::action_type)
                .select((usage_log::action_type, count_star()))
                .load::<(String, i64)>(&mut conn)?;

            let mut counts = UsageCounts::default();
            for (action_type, count) in rows {
                match ActionKind::from_str(&action_type) {
                    Some(ActionKind::Consultation) => counts.consultations = count,
                    Some(ActionKind::Document) => counts.documents = count,
                    Some(ActionKind::Analysis) => counts.analyses = count,
                    None => warn!(%action_type, "usage: unknown action type in usage_log"),
                }
            }

            Ok(counts)
        })
        .await??)
    }
}
