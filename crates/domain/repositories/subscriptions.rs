use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::subscriptions::SubscriptionEntity, value_objects::ledger::TrialActivation,
};

#[async_trait]
#[automock]
pub trait SubscriptionRepository {
    /// Latest row with `status = 'active'`, whether or not its window has passed.
    async fn find_current_active(&self, user_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    /// Conditionally flips an overdue `active` row to `expired` and returns the
    /// stored row afterwards, whoever won the update.
    async fn mark_expired(
        &self,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionEntity>;

    async fn start_trial(
        &self,
        user_id: Uuid,
        duration_days: i32,
        now: DateTime<Utc>,
    ) -> Result<TrialActivation>;

    async fn cancel_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<SubscriptionEntity>>;
}
