use std::sync::Arc;

use chrono::{DateTime, Utc};
use jurist_core::domain::{
    entities::{
        plans::PlanEntity,
        subscriptions::SubscriptionEntity,
        users::{UserEntity, UserProfile},
    },
    repositories::{
        plans::PlanRepository, subscriptions::SubscriptionRepository, users::UserRepository,
    },
    value_objects::{
        enums::plan_kinds::PlanKind, ledger::TrialActivation, plans::PlanDto,
        subscriptions::SubscriptionStatusDto,
    },
};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::errors::{BillingError, UseCaseResult};

/// Owns the lifecycle rules of subscriptions: what counts as active, lazy
/// expiry, the one-time trial and explicit cancellation.
pub struct SubscriptionLedger<U, S, P>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    subscription_repo: Arc<S>,
    plan_repo: Arc<P>,
}

impl<U, S, P> SubscriptionLedger<U, S, P>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
{
    pub fn new(user_repo: Arc<U>, subscription_repo: Arc<S>, plan_repo: Arc<P>) -> Self {
        Self {
            user_repo,
            subscription_repo,
            plan_repo,
        }
    }

    pub async fn user_for(&self, telegram_id: i64, profile: UserProfile) -> UseCaseResult<UserEntity> {
        self.user_repo
            .get_or_create(telegram_id, profile)
            .await
            .map_err(|err| {
                error!(%telegram_id, db_error = ?err, "ledger: failed to upsert user");
                BillingError::TransientInfra(err)
            })
    }

    pub async fn find_user(&self, telegram_id: i64) -> UseCaseResult<Option<UserEntity>> {
        self.user_repo
            .find_by_telegram_id(telegram_id)
            .await
            .map_err(|err| {
                error!(%telegram_id, db_error = ?err, "ledger: failed to load user");
                BillingError::TransientInfra(err)
            })
    }

    pub async fn plan(&self, kind: PlanKind) -> UseCaseResult<Option<PlanEntity>> {
        self.plan_repo.find_by_kind(kind).await.map_err(|err| {
            error!(plan_kind = %kind, db_error = ?err, "ledger: failed to load plan");
            BillingError::TransientInfra(err)
        })
    }

    pub async fn list_plans(&self) -> UseCaseResult<Vec<PlanDto>> {
        let plans = self.plan_repo.list_plans().await.map_err(|err| {
            error!(db_error = ?err, "ledger: failed to list plans");
            BillingError::TransientInfra(err)
        })?;
        Ok(plans.into_iter().map(PlanDto::from).collect())
    }

    /// The user's subscription if it is active right now. A stored `active`
    /// row whose window has passed is expired on the way out.
    pub async fn get_active_subscription(
        &self,
        user_id: Uuid,
    ) -> UseCaseResult<Option<SubscriptionEntity>> {
        let now = Utc::now();
        let current = self
            .subscription_repo
            .find_current_active(user_id)
            .await
            .map_err(|err| {
                error!(%user_id, db_error = ?err, "ledger: failed to load active subscription");
                BillingError::TransientInfra(err)
            })?;

        let Some(subscription) = current else {
            return Ok(None);
        };

        if subscription.is_active_at(now) {
            return Ok(Some(subscription));
        }

        self.expire_if_due(subscription, now).await?;
        Ok(None)
    }

    pub async fn expire_if_due(
        &self,
        subscription: SubscriptionEntity,
        now: DateTime<Utc>,
    ) -> UseCaseResult<SubscriptionEntity> {
        if !subscription.is_due_for_expiry(now) {
            return Ok(subscription);
        }

        let subscription_id = subscription.id;
        let stored = self
            .subscription_repo
            .mark_expired(subscription_id, now)
            .await
            .map_err(|err| {
                error!(%subscription_id, db_error = ?err, "ledger: failed to expire subscription");
                BillingError::TransientInfra(err)
            })?;

        info!(
            %subscription_id,
            user_id = %stored.user_id,
            expires_at = %stored.expires_at,
            status = %stored.status,
            "ledger: subscription past its window"
        );
        Ok(stored)
    }

    pub async fn subscription_status(&self, telegram_id: i64) -> UseCaseResult<SubscriptionStatusDto> {
        let Some(user) = self.find_user(telegram_id).await? else {
            return Ok(SubscriptionStatusDto {
                has_subscription: false,
                subscription_id: None,
                plan_kind: None,
                status: None,
                started_at: None,
                expires_at: None,
                trial_used: false,
            });
        };

        let active = self.get_active_subscription(user.id).await?;
        Ok(SubscriptionStatusDto {
            has_subscription: active.is_some(),
            subscription_id: active.as_ref().map(|sub| sub.id),
            plan_kind: active.as_ref().and_then(SubscriptionEntity::plan_kind),
            status: active.as_ref().map(SubscriptionEntity::status),
            started_at: active.as_ref().map(|sub| sub.started_at),
            expires_at: active.as_ref().map(|sub| sub.expires_at),
            trial_used: user.trial_used,
        })
    }

    pub async fn start_trial(
        &self,
        telegram_id: i64,
        profile: UserProfile,
    ) -> UseCaseResult<SubscriptionEntity> {
        let user = self.user_for(telegram_id, profile).await?;
        if user.trial_used {
            info!(%telegram_id, "ledger: trial refused, already used");
            return Err(BillingError::Conflict("trial already used".to_string()));
        }

        let trial_plan = self.plan(PlanKind::Trial).await?.ok_or_else(|| {
            error!("ledger: trial plan missing from subscription_limits");
            BillingError::NotFound("trial plan".to_string())
        })?;

        let activation = self
            .subscription_repo
            .start_trial(user.id, trial_plan.duration_days, Utc::now())
            .await
            .map_err(|err| {
                error!(%telegram_id, db_error = ?err, "ledger: failed to start trial");
                BillingError::TransientInfra(err)
            })?;

        match activation {
            TrialActivation::Started {
                subscription,
                superseded,
            } => {
                info!(
                    %telegram_id,
                    subscription_id = %subscription.id,
                    expires_at = %subscription.expires_at,
                    superseded = superseded.len(),
                    "ledger: trial started"
                );
                Ok(subscription)
            }
            TrialActivation::AlreadyUsed => {
                warn!(%telegram_id, "ledger: concurrent trial request lost the race");
                Err(BillingError::Conflict("trial already used".to_string()))
            }
        }
    }

    pub async fn cancel_active(&self, telegram_id: i64) -> UseCaseResult<SubscriptionEntity> {
        let user = self
            .find_user(telegram_id)
            .await?
            .ok_or_else(|| BillingError::NotFound("active subscription".to_string()))?;

        let cancelled = self
            .subscription_repo
            .cancel_active(user.id, Utc::now())
            .await
            .map_err(|err| {
                error!(%telegram_id, db_error = ?err, "ledger: failed to cancel subscription");
                BillingError::TransientInfra(err)
            })?
            .ok_or_else(|| BillingError::NotFound("active subscription".to_string()))?;

        info!(
            %telegram_id,
            subscription_id = %cancelled.id,
            plan_kind = %cancelled.plan_kind,
            "ledger: subscription cancelled on request"
        );
        Ok(cancelled)
    }
}
