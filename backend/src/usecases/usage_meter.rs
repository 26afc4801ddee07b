use std::sync::Arc;

use jurist_core::domain::{
    entities::subscriptions::SubscriptionEntity,
    repositories::{
        plans::PlanRepository, subscriptions::SubscriptionRepository, usage::UsageRepository,
        users::UserRepository,
    },
    value_objects::{
        enums::action_kinds::ActionKind,
        ledger::NewUsageEvent,
        plans::Quota,
        subscriptions::{ActionUsage, UsageStatsDto},
    },
};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    errors::{BillingError, UseCaseResult},
    subscription_ledger::SubscriptionLedger,
};

/// Outcome of a successful metered action.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageReceipt {
    pub event_id: Uuid,
    pub action: ActionKind,
    /// Count inside the billing period including this event. Stays 0 for
    /// unlimited quotas, which are not counted.
    pub used: i64,
    pub limit: Quota,
}

struct Allowance {
    subscription: SubscriptionEntity,
    used: i64,
    limit: Quota,
}

enum Verdict {
    NoSubscription,
    Allowed(Allowance),
    Denied { used: i64, limit: Quota },
}

pub struct UsageMeter<U, S, P, R>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    R: UsageRepository + Send + Sync + 'static,
{
    ledger: Arc<SubscriptionLedger<U, S, P>>,
    usage_repo: Arc<R>,
}

impl<U, S, P, R> UsageMeter<U, S, P, R>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    R: UsageRepository + Send + Sync + 'static,
{
    pub fn new(ledger: Arc<SubscriptionLedger<U, S, P>>, usage_repo: Arc<R>) -> Self {
        Self { ledger, usage_repo }
    }

    async fn count_in_period(
        &self,
        subscription: &SubscriptionEntity,
        action: ActionKind,
    ) -> UseCaseResult<i64> {
        self.usage_repo
            .count_in_period(
                subscription.user_id,
                subscription.id,
                action,
                subscription.started_at,
                subscription.expires_at,
            )
            .await
            .map_err(|err| {
                error!(
                    user_id = %subscription.user_id,
                    subscription_id = %subscription.id,
                    %action,
                    db_error = ?err,
                    "usage: failed to count usage"
                );
                BillingError::TransientInfra(err)
            })
    }

    async fn quota_for(
        &self,
        subscription: &SubscriptionEntity,
        action: ActionKind,
    ) -> UseCaseResult<Option<Quota>> {
        let Some(kind) = subscription.plan_kind() else {
            warn!(
                subscription_id = %subscription.id,
                plan_kind = %subscription.plan_kind,
                "usage: subscription carries an unknown plan kind"
            );
            return Ok(None);
        };

        let plan = self.ledger.plan(kind).await?;
        if plan.is_none() {
            warn!(plan_kind = %kind, "usage: plan missing from subscription_limits");
        }
        Ok(plan.map(|plan| plan.quotas.for_action(action)))
    }

    async fn evaluate(&self, user_id: Uuid, action: ActionKind) -> UseCaseResult<Verdict> {
        let Some(subscription) = self.ledger.get_active_subscription(user_id).await? else {
            return Ok(Verdict::NoSubscription);
        };

        let Some(limit) = self.quota_for(&subscription, action).await? else {
            return Ok(Verdict::Denied {
                used: 0,
                limit: Quota::Limited(0),
            });
        };

        let used = match limit {
            Quota::Unlimited => 0,
            Quota::Limited(_) => self.count_in_period(&subscription, action).await?,
        };

        if limit.allows(used) {
            Ok(Verdict::Allowed(Allowance {
                subscription,
                used,
                limit,
            }))
        } else {
            Ok(Verdict::Denied { used, limit })
        }
    }

    /// Advisory check; nothing is reserved.
    pub async fn check_limit(&self, user_id: Uuid, action: ActionKind) -> UseCaseResult<bool> {
        let allowed = matches!(self.evaluate(user_id, action).await?, Verdict::Allowed(_));
        info!(%user_id, %action, allowed, "usage: limit checked");
        Ok(allowed)
    }

    async fn allowance(&self, user_id: Uuid, action: ActionKind) -> UseCaseResult<Allowance> {
        match self.evaluate(user_id, action).await? {
            Verdict::Allowed(allowance) => Ok(allowance),
            Verdict::NoSubscription => Err(BillingError::NoActiveSubscription),
            Verdict::Denied { used, limit } => {
                info!(%user_id, %action, used, limit = limit.as_raw(), "usage: quota exhausted");
                Err(BillingError::QuotaExceeded {
                    action,
                    used,
                    limit,
                })
            }
        }
    }

    /// Like `check_limit`, but the denial carries its reason.
    pub async fn ensure_allowed(
        &self,
        user_id: Uuid,
        action: ActionKind,
    ) -> UseCaseResult<SubscriptionEntity> {
        Ok(self.allowance(user_id, action).await?.subscription)
    }

    /// Appends to the usage log against the current active subscription.
    /// Quotas are not enforced here.
    pub async fn record_usage(
        &self,
        user_id: Uuid,
        action: ActionKind,
        details: serde_json::Value,
    ) -> UseCaseResult<Uuid> {
        let subscription = self
            .ledger
            .get_active_subscription(user_id)
            .await?
            .ok_or(BillingError::NoActiveSubscription)?;

        let event_id = self
            .usage_repo
            .append(NewUsageEvent {
                user_id,
                subscription_id: subscription.id,
                action,
                details,
                recorded_at: Utc::now(),
            })
            .await
            .map_err(|err| {
                error!(%user_id, %action, db_error = ?err, "usage: failed to record usage");
                BillingError::TransientInfra(err)
            })?;

        info!(
            %user_id,
            %action,
            subscription_id = %subscription.id,
            %event_id,
            "usage: recorded"
        );
        Ok(event_id)
    }

    /// Check and record in one call, for actions the bot performs itself.
    pub async fn consume(
        &self,
        telegram_id: i64,
        action: ActionKind,
        details: serde_json::Value,
    ) -> UseCaseResult<UsageReceipt> {
        let user = self
            .ledger
            .find_user(telegram_id)
            .await?
            .ok_or(BillingError::NoActiveSubscription)?;

        let allowance = self.allowance(user.id, action).await?;

        let event_id = self.record_usage(user.id, action, details).await?;
        let used = match allowance.limit {
            Quota::Unlimited => 0,
            Quota::Limited(_) => allowance.used + 1,
        };
        Ok(UsageReceipt {
            event_id,
            action,
            used,
            limit: allowance.limit,
        })
    }

    pub async fn usage_stats(&self, telegram_id: i64) -> UseCaseResult<UsageStatsDto> {
        let user = self
            .ledger
            .find_user(telegram_id)
            .await?
            .ok_or(BillingError::NoActiveSubscription)?;
        let subscription = self
            .ledger
            .get_active_subscription(user.id)
            .await?
            .ok_or(BillingError::NoActiveSubscription)?;

        let plan_kind = subscription.plan_kind().ok_or_else(|| {
            BillingError::TransientInfra(anyhow::anyhow!(
                "subscription {} carries unknown plan kind {}",
                subscription.id,
                subscription.plan_kind
            ))
        })?;
        let plan = self
            .ledger
            .plan(plan_kind)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("plan {plan_kind}")))?;

        let counts = self
            .usage_repo
            .usage_breakdown(
                user.id,
                subscription.id,
                subscription.started_at,
                subscription.expires_at,
            )
            .await
            .map_err(|err| {
                error!(%telegram_id, db_error = ?err, "usage: failed to load usage breakdown");
                BillingError::TransientInfra(err)
            })?;

        Ok(UsageStatsDto {
            plan_kind,
            expires_at: subscription.expires_at,
            consultations: ActionUsage {
                used: counts.consultations,
                limit: plan.quotas.consultations,
            },
            documents: ActionUsage {
                used: counts.documents,
                limit: plan.quotas.documents,
            },
            analyses: ActionUsage {
                used: counts.analyses,
                limit: plan.quotas.analyses,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::subscription_ledger::tests::{
        basic_plan, sample_subscription, sample_user,
    };
    use chrono::{Duration, Utc};
    use jurist_core::domain::{
        entities::plans::PlanEntity,
        repositories::{
            plans::MockPlanRepository, subscriptions::MockSubscriptionRepository,
            usage::MockUsageRepository, users::MockUserRepository,
        },
        value_objects::enums::{
            plan_kinds::PlanKind, subscription_statuses::SubscriptionStatus,
        },
    };
    use mockall::predicate::{always, eq, function};

    type Meter = UsageMeter<
        MockUserRepository,
        MockSubscriptionRepository,
        MockPlanRepository,
        MockUsageRepository,
    >;

    fn meter(
        users: MockUserRepository,
        subscriptions: MockSubscriptionRepository,
        plans: MockPlanRepository,
        usage: MockUsageRepository,
    ) -> Meter {
        let ledger = SubscriptionLedger::new(Arc::new(users), Arc::new(subscriptions), Arc::new(plans));
        UsageMeter::new(Arc::new(ledger), Arc::new(usage))
    }

    fn active_basic(user_id: Uuid) -> SubscriptionEntity {
        let now = Utc::now();
        sample_subscription(
            user_id,
            PlanKind::Basic,
            SubscriptionStatus::Active,
            now - Duration::days(3),
            now + Duration::days(27),
        )
    }

    fn subscriptions_returning(subscription: Option<SubscriptionEntity>) -> MockSubscriptionRepository {
        let mut subscriptions = MockSubscriptionRepository::new();
        subscriptions.expect_find_current_active().returning(move |_| {
            let subscription = subscription.clone();
            Box::pin(async move { Ok(subscription) })
        });
        subscriptions
    }

    fn plans_returning(plan: PlanEntity) -> MockPlanRepository {
        let mut plans = MockPlanRepository::new();
        plans
            .expect_find_by_kind()
            .with(eq(plan.kind))
            .returning(move |_| {
                let plan = plan.clone();
                Box::pin(async move { Ok(Some(plan)) })
            });
        plans
    }

    #[tokio::test]
    async fn no_active_subscription_means_denied() {
        let mut usage = MockUsageRepository::new();
        usage.expect_count_in_period().never();

        let meter = meter(
            MockUserRepository::new(),
            subscriptions_returning(None),
            MockPlanRepository::new(),
            usage,
        );

        let allowed = meter
            .check_limit(Uuid::new_v4(), ActionKind::Consultation)
            .await
            .unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn unlimited_quota_skips_counting() {
        let user_id = Uuid::new_v4();
        let mut plan = basic_plan();
        plan.quotas.consultations = Quota::from_raw(-1);

        let mut usage = MockUsageRepository::new();
        usage.expect_count_in_period().never();

        let meter = meter(
            MockUserRepository::new(),
            subscriptions_returning(Some(active_basic(user_id))),
            plans_returning(plan),
            usage,
        );

        assert!(meter.check_limit(user_id, ActionKind::Consultation).await.unwrap());
    }

    #[tokio::test]
    async fn twenty_fifth_consultation_exhausts_basic_plan() {
        let user_id = Uuid::new_v4();
        let subscription = active_basic(user_id);
        let subscription_id = subscription.id;
        let (started_at, expires_at) = (subscription.started_at, subscription.expires_at);

        let mut usage = MockUsageRepository::new();
        usage
            .expect_count_in_period()
            .with(
                eq(user_id),
                eq(subscription_id),
                eq(ActionKind::Consultation),
                eq(started_at),
                eq(expires_at),
            )
            .returning(|_, _, _, _, _| Box::pin(async { Ok(25) }));
        usage
            .expect_count_in_period()
            .with(
                eq(user_id),
                eq(subscription_id),
                eq(ActionKind::Document),
                always(),
                always(),
            )
            .returning(|_, _, _, _, _| Box::pin(async { Ok(4) }));

        let meter = meter(
            MockUserRepository::new(),
            subscriptions_returning(Some(subscription)),
            plans_returning(basic_plan()),
            usage,
        );

        assert!(!meter.check_limit(user_id, ActionKind::Consultation).await.unwrap());
        assert!(meter.check_limit(user_id, ActionKind::Document).await.unwrap());

        let err = meter
            .ensure_allowed(user_id, ActionKind::Consultation)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::QuotaExceeded {
                action: ActionKind::Consultation,
                used: 25,
                limit: Quota::Limited(25),
            }
        ));
    }

    #[tokio::test]
    async fn record_usage_appends_against_active_subscription() {
        let user_id = Uuid::new_v4();
        let subscription = active_basic(user_id);
        let subscription_id = subscription.id;
        let (started_at, expires_at) = (subscription.started_at, subscription.expires_at);
        let event_id = Uuid::new_v4();

        let mut usage = MockUsageRepository::new();
        usage
            .expect_append()
            .with(function(move |event: &NewUsageEvent| {
                event.user_id == user_id
                    && event.subscription_id == subscription_id
                    && event.action == ActionKind::Analysis
                    && event.details == serde_json::json!({ "file": "contract.pdf" })
                    && event.recorded_at >= started_at
                    && event.recorded_at < expires_at
            }))
            .times(1)
            .returning(move |_| Box::pin(async move { Ok(event_id) }));

        let meter = meter(
            MockUserRepository::new(),
            subscriptions_returning(Some(subscription)),
            MockPlanRepository::new(),
            usage,
        );

        let recorded = meter
            .record_usage(
                user_id,
                ActionKind::Analysis,
                serde_json::json!({ "file": "contract.pdf" }),
            )
            .await
            .unwrap();
        assert_eq!(recorded, event_id);
    }

    #[tokio::test]
    async fn record_usage_without_subscription_is_refused() {
        let mut usage = MockUsageRepository::new();
        usage.expect_append().never();

        let meter = meter(
            MockUserRepository::new(),
            subscriptions_returning(None),
            MockPlanRepository::new(),
            usage,
        );

        let err = meter
            .record_usage(Uuid::new_v4(), ActionKind::Document, serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NoActiveSubscription));
    }

    #[tokio::test]
    async fn consume_reports_running_count() {
        let user = sample_user(4242, false);
        let user_id = user.id;

        let mut users = MockUserRepository::new();
        users
            .expect_find_by_telegram_id()
            .with(eq(4242_i64))
            .returning(move |_| {
                let user = user.clone();
                Box::pin(async move { Ok(Some(user)) })
            });

        let mut usage = MockUsageRepository::new();
        usage
            .expect_count_in_period()
            .returning(|_, _, _, _, _| Box::pin(async { Ok(2) }));
        usage
            .expect_append()
            .times(1)
            .returning(|_| Box::pin(async { Ok(Uuid::new_v4()) }));

        let meter = meter(
            users,
            subscriptions_returning(Some(active_basic(user_id))),
            plans_returning(basic_plan()),
            usage,
        );

        let receipt = meter
            .consume(4242, ActionKind::Document, serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(receipt.used, 3);
        assert_eq!(receipt.limit, Quota::Limited(5));
    }

    #[tokio::test]
    async fn consume_on_unlimited_quota_reports_no_count() {
        let user = sample_user(4343, false);
        let user_id = user.id;
        let mut plan = basic_plan();
        plan.quotas.consultations = Quota::Unlimited;

        let mut users = MockUserRepository::new();
        users.expect_find_by_telegram_id().returning(move |_| {
            let user = user.clone();
            Box::pin(async move { Ok(Some(user)) })
        });

        let mut usage = MockUsageRepository::new();
        usage.expect_count_in_period().never();
        usage
            .expect_append()
            .times(2)
            .returning(|_| Box::pin(async { Ok(Uuid::new_v4()) }));

        let meter = meter(
            users,
            subscriptions_returning(Some(active_basic(user_id))),
            plans_returning(plan),
            usage,
        );

        for _ in 0..2 {
            let receipt = meter
                .consume(4343, ActionKind::Consultation, serde_json::Value::Null)
                .await
                .unwrap();
            assert_eq!(receipt.used, 0);
            assert_eq!(receipt.limit, Quota::Unlimited);
        }
    }

    #[tokio::test]
    async fn usage_stats_pair_counts_with_quotas() {
        let user = sample_user(99, true);
        let user_id = user.id;
        let subscription = active_basic(user_id);
        let expires_at = subscription.expires_at;

        let mut users = MockUserRepository::new();
        users.expect_find_by_telegram_id().returning(move |_| {
            let user = user.clone();
            Box::pin(async move { Ok(Some(user)) })
        });

        let mut usage = MockUsageRepository::new();
        usage.expect_usage_breakdown().returning(|_, _, _, _| {
            Box::pin(async {
                Ok(jurist_core::domain::value_objects::subscriptions::UsageCounts {
                    consultations: 7,
                    documents: 1,
                    analyses: 0,
                })
            })
        });

        let meter = meter(
            users,
            subscriptions_returning(Some(subscription)),
            plans_returning(basic_plan()),
            usage,
        );

        let stats = meter.usage_stats(99).await.unwrap();
        assert_eq!(stats.plan_kind, PlanKind::Basic);
        assert_eq!(stats.expires_at, expires_at);
        assert_eq!(
            stats.consultations,
            ActionUsage {
                used: 7,
                limit: Quota::Limited(25)
            }
        );
        assert_eq!(stats.analyses.used, 0);
    }
}
