use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::{RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
            users::UserEntity,
        },
        repositories::subscriptions::SubscriptionRepository,
        value_objects::{
            enums::{plan_kinds::PlanKind, subscription_statuses::SubscriptionStatus},
            ledger::TrialActivation,
        },
    },
    infra::db::{
        postgres::{
            postgres_connection::PgPoolSquad,
            schema::{subscriptions, users},
        },
        repositories::subscription_rows::{
            detach_from_users, lock_user, point_user_at, supersede_active,
        },
    },
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn find_current_active(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            let subscription = subscriptions::table
                .filter(subscriptions::user_id.eq(user_id))
                .filter(subscriptions::status.eq(SubscriptionStatus::Active.as_str()))
                .order(subscriptions::expires_at.desc())
                .select(SubscriptionEntity::as_select())
                .first::<SubscriptionEntity>(&mut conn)
                .optional()?;

            Ok(subscription)
        })
        .await??)
    }

    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            let subscription = subscriptions::table
                .find(subscription_id)
                .select(SubscriptionEntity::as_select())
                .first::<SubscriptionEntity>(&mut conn)
                .optional()?;

            Ok(subscription)
        })
        .await??)
    }

    async fn mark_expired(
        &self,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionEntity> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<SubscriptionEntity> {
            let mut conn = db_pool.get()?;

            // Conditional so concurrent readers and a racing cancellation agree on one outcome.
            let updated = update(subscriptions::table.find(subscription_id))
                .filter(subscriptions::status.eq(SubscriptionStatus::Active.as_str()))
                .filter(subscriptions::expires_at.le(now))
                .set((
                    subscriptions::status.eq(SubscriptionStatus::Expired.as_str()),
                    subscriptions::updated_at.eq(now),
                ))
                .returning(SubscriptionEntity::as_returning())
                .get_result::<SubscriptionEntity>(&mut conn)
                .optional()?;

            match updated {
                Some(subscription) => Ok(subscription),
                None => Ok(subscriptions::table
                    .find(subscription_id)
                    .select(SubscriptionEntity::as_select())
                    .first::<SubscriptionEntity>(&mut conn)?),
            }
        })
        .await??)
    }

    async fn start_trial(
        &self,
        user_id: Uuid,
        duration_days: i32,
        now: DateTime<Utc>,
    ) -> Result<TrialActivation> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<TrialActivation> {
            let mut conn = db_pool.get()?;

            let activation = conn.transaction::<TrialActivation, diesel::result::Error, _>(|tx| {
                let user = users::table
                    .find(user_id)
                    .select(UserEntity::as_select())
                    .for_update()
                    .first::<UserEntity>(tx)?;

                if user.trial_used {
                    return Ok(TrialActivation::AlreadyUsed);
                }

                let superseded = supersede_active(tx, user_id, now)?;

                let subscription = insert_into(subscriptions::table)
                    .values(&InsertSubscriptionEntity {
                        user_id,
                        plan_kind: PlanKind::Trial.as_str().to_string(),
                        status: SubscriptionStatus::Active.as_str().to_string(),
                        started_at: now,
                        expires_at: now + Duration::days(i64::from(duration_days)),
                        provider_payment_id: None,
                        auto_renewal: false,
                    })
                    .returning(SubscriptionEntity::as_returning())
                    .get_result::<SubscriptionEntity>(tx)?;

                update(users::table.find(user_id))
                    .set((
                        users::trial_used.eq(true),
                        users::trial_started_at.eq(Some(now)),
                    ))
                    .execute(tx)?;
                point_user_at(tx, user_id, Some(subscription.id), now)?;

                Ok(TrialActivation::Started {
                    subscription,
                    superseded,
                })
            })?;

            Ok(activation)
        })
        .await??)
    }

    async fn cancel_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<SubscriptionEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<SubscriptionEntity>> {
            let mut conn = db_pool.get()?;

            let cancelled =
                conn.transaction::<Option<SubscriptionEntity>, diesel::result::Error, _>(|tx| {
                    lock_user(tx, user_id)?;

                    let cancelled = update(subscriptions::table)
                        .filter(subscriptions::user_id.eq(user_id))
                        .filter(subscriptions::status.eq(SubscriptionStatus::Active.as_str()))
                        .filter(subscriptions::expires_at.gt(now))
                        .set((
                            subscriptions::status.eq(SubscriptionStatus::Cancelled.as_str()),
                            subscriptions::cancelled_at.eq(Some(now)),
                            subscriptions::auto_renewal.eq(false),
                            subscriptions::updated_at.eq(now),
                        ))
                        .returning(SubscriptionEntity::as_returning())
                        .get_results::<SubscriptionEntity>(tx)?;

                    for subscription in &cancelled {
                        detach_from_users(tx, subscription.id, now)?;
                    }

                    Ok(cancelled.into_iter().next())
                })?;

            Ok(cancelled)
        })
        .await??)
    }
}
