use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::action_kinds::ActionKind, ledger::NewUsageEvent, subscriptions::UsageCounts,
};

#[async_trait]
#[automock]
pub trait UsageRepository {
    async fn append(&self, event: NewUsageEvent) -> Result<Uuid>;

    /// Counts events in `[from, to)`.
    async fn count_in_period(
        &self,
        user_id: Uuid,
        subscription_id: Uuid,
        action: ActionKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64>;

    async fn usage_breakdown(
        &self,
        user_id: Uuid,
        subscription_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<UsageCounts>;
}
