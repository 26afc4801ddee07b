use std::sync::Arc;

use chrono::{Duration, Utc};
use jurist_core::{
    domain::{
        entities::users::UserProfile,
        repositories::{
            payments::PaymentRepository, plans::PlanRepository,
            subscriptions::SubscriptionRepository, users::UserRepository,
        },
        value_objects::{
            enums::plan_kinds::PlanKind, ledger::NewCheckout, subscriptions::CheckoutLinkDto,
        },
    },
    payments::yookassa_client::CreatePaymentRequest,
};
use tracing::{error, info};

use super::{
    errors::{BillingError, UseCaseResult},
    gateways::PaymentGateway,
    subscription_ledger::SubscriptionLedger,
};

pub struct CheckoutUseCase<U, S, P, Pay, G>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    ledger: Arc<SubscriptionLedger<U, S, P>>,
    payment_repo: Arc<Pay>,
    gateway: Arc<G>,
}

impl<U, S, P, Pay, G> CheckoutUseCase<U, S, P, Pay, G>
where
    U: UserRepository + Send + Sync + 'static,
    S: SubscriptionRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
{
    pub fn new(
        ledger: Arc<SubscriptionLedger<U, S, P>>,
        payment_repo: Arc<Pay>,
        gateway: Arc<G>,
    ) -> Self {
        Self {
            ledger,
            payment_repo,
            gateway,
        }
    }

    /// Creates a provider payment for a paid plan and records it locally as
    /// pending, together with the subscription it will activate.
    ///
    /// A renewal must keep the plan of the live subscription; its window is
    /// appended to the days still left.
    pub async fn create_checkout(
        &self,
        telegram_id: i64,
        profile: UserProfile,
        plan_kind: &str,
        renewal: bool,
    ) -> UseCaseResult<CheckoutLinkDto> {
        let plan_kind = PlanKind::from_str(plan_kind)
            .filter(PlanKind::is_purchasable)
            .ok_or_else(|| BillingError::Validation(format!("plan '{plan_kind}' cannot be purchased")))?;

        let plan = self
            .ledger
            .plan(plan_kind)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("plan {plan_kind}")))?;

        let user = self.ledger.user_for(telegram_id, profile).await?;

        let now = Utc::now();
        let window_base = if renewal {
            let current = self
                .ledger
                .get_active_subscription(user.id)
                .await?
                .ok_or(BillingError::NoActiveSubscription)?;
            if current.plan_kind() != Some(plan_kind) {
                return Err(BillingError::Validation(format!(
                    "renewal must keep the current plan {}",
                    current.plan_kind
                )));
            }
            current.expires_at
        } else {
            now
        };

        let payment = self
            .gateway
            .create_payment(CreatePaymentRequest {
                telegram_id,
                plan_kind,
                plan_title: plan.title.clone(),
                amount_kopecks: plan.price_kopecks,
                renewal,
            })
            .await
            .map_err(|err| {
                error!(%telegram_id, %plan_kind, error = ?err, "checkout: provider refused to create payment");
                BillingError::TransientInfra(err)
            })?;

        let confirmation_url = payment
            .confirmation_url()
            .map(str::to_string)
            .ok_or_else(|| {
                error!(
                    provider_payment_id = %payment.id,
                    "checkout: provider returned no confirmation url"
                );
                BillingError::TransientInfra(anyhow::anyhow!(
                    "payment {} has no confirmation url",
                    payment.id
                ))
            })?;

        let record = self
            .payment_repo
            .create_pending_checkout(NewCheckout {
                user_id: user.id,
                plan_kind,
                provider_payment_id: payment.id.clone(),
                amount_kopecks: plan.price_kopecks,
                confirmation_url: Some(confirmation_url.clone()),
                renewal,
                started_at: now,
                expires_at: window_base + Duration::days(i64::from(plan.duration_days)),
            })
            .await
            .map_err(|err| {
                error!(
                    %telegram_id,
                    provider_payment_id = %payment.id,
                    db_error = ?err,
                    "checkout: failed to record pending payment"
                );
                BillingError::TransientInfra(err)
            })?;

        info!(
            %telegram_id,
            %plan_kind,
            renewal,
            provider_payment_id = %record.payment.provider_payment_id,
            subscription_id = %record.subscription.id,
            amount_kopecks = plan.price_kopecks,
            "checkout: payment created"
        );

        Ok(CheckoutLinkDto {
            provider_payment_id: record.payment.provider_payment_id,
            confirmation_url,
            plan_kind,
            amount_kopecks: plan.price_kopecks,
            renewal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::{
        gateways::MockPaymentGateway,
        subscription_ledger::tests::{basic_plan, sample_subscription, sample_user},
    };
    use jurist_core::{
        domain::{
            entities::{payments::PaymentEntity, subscriptions::SubscriptionEntity},
            repositories::{
                payments::MockPaymentRepository, plans::MockPlanRepository,
                subscriptions::MockSubscriptionRepository, users::MockUserRepository,
            },
            value_objects::{
                enums::{
                    payment_statuses::PaymentStatus, subscription_statuses::SubscriptionStatus,
                },
                ledger::CheckoutRecord,
            },
        },
        payments::yookassa_client::ProviderPayment,
    };
    use mockall::predicate::{always, eq, function};
    use serde_json::json;
    use uuid::Uuid;

    type Checkout = CheckoutUseCase<
        MockUserRepository,
        MockSubscriptionRepository,
        MockPlanRepository,
        MockPaymentRepository,
        MockPaymentGateway,
    >;

    fn build(
        users: MockUserRepository,
        subscriptions: MockSubscriptionRepository,
        plans: MockPlanRepository,
        payments: MockPaymentRepository,
        gateway: MockPaymentGateway,
    ) -> Checkout {
        let ledger = SubscriptionLedger::new(Arc::new(users), Arc::new(subscriptions), Arc::new(plans));
        CheckoutUseCase::new(Arc::new(ledger), Arc::new(payments), Arc::new(gateway))
    }

    fn users_returning(telegram_id: i64) -> (MockUserRepository, Uuid) {
        let user = sample_user(telegram_id, false);
        let user_id = user.id;
        let mut users = MockUserRepository::new();
        users
            .expect_get_or_create()
            .with(eq(telegram_id), always())
            .returning(move |_, _| {
                let user = user.clone();
                Box::pin(async move { Ok(user) })
            });
        (users, user_id)
    }

    fn basic_plans() -> MockPlanRepository {
        let mut plans = MockPlanRepository::new();
        plans
            .expect_find_by_kind()
            .with(eq(PlanKind::Basic))
            .returning(|_| Box::pin(async { Ok(Some(basic_plan())) }));
        plans
    }

    fn gateway_creating(payment_id: &'static str, renewal: bool) -> MockPaymentGateway {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_payment()
            .with(function(move |request: &CreatePaymentRequest| {
                request.plan_kind == PlanKind::Basic
                    && request.amount_kopecks == 79000
                    && request.renewal == renewal
            }))
            .times(1)
            .returning(move |_| {
                let payment: ProviderPayment = serde_json::from_value(json!({
                    "id": payment_id,
                    "status": "pending",
                    "confirmation": {
                        "type": "redirect",
                        "confirmation_url": format!("https://yoomoney.ru/checkout/payments/v2/contract?orderId={payment_id}")
                    }
                }))
                .unwrap();
                Box::pin(async move { Ok(payment) })
            });
        gateway
    }

    fn pending_record(checkout: &NewCheckout) -> CheckoutRecord {
        let subscription = sample_subscription(
            checkout.user_id,
            checkout.plan_kind,
            SubscriptionStatus::Pending,
            checkout.started_at,
            checkout.expires_at,
        );
        let payment = PaymentEntity {
            id: Uuid::new_v4(),
            user_id: checkout.user_id,
            subscription_id: Some(subscription.id),
            plan_kind: checkout.plan_kind.as_str().to_string(),
            provider_payment_id: checkout.provider_payment_id.clone(),
            amount_kopecks: checkout.amount_kopecks,
            status: PaymentStatus::Pending.as_str().to_string(),
            confirmation_url: checkout.confirmation_url.clone(),
            renewal: checkout.renewal,
            created_at: checkout.started_at,
            updated_at: checkout.started_at,
        };
        CheckoutRecord {
            subscription,
            payment,
        }
    }

    fn active_subscriptions(subscription: Option<SubscriptionEntity>) -> MockSubscriptionRepository {
        let mut subscriptions = MockSubscriptionRepository::new();
        subscriptions.expect_find_current_active().returning(move |_| {
            let subscription = subscription.clone();
            Box::pin(async move { Ok(subscription) })
        });
        subscriptions
    }

    #[tokio::test]
    async fn trial_and_unknown_plans_are_rejected() {
        let usecase = build(
            MockUserRepository::new(),
            MockSubscriptionRepository::new(),
            MockPlanRepository::new(),
            MockPaymentRepository::new(),
            MockPaymentGateway::new(),
        );

        for plan in ["trial", "gold", ""] {
            let err = usecase
                .create_checkout(1, UserProfile::default(), plan, false)
                .await
                .unwrap_err();
            assert!(matches!(err, BillingError::Validation(_)), "plan {plan}");
        }
    }

    #[tokio::test]
    async fn checkout_records_pending_payment_and_subscription() {
        let (users, user_id) = users_returning(321);

        let mut payments = MockPaymentRepository::new();
        payments
            .expect_create_pending_checkout()
            .with(function(move |checkout: &NewCheckout| {
                checkout.user_id == user_id
                    && checkout.provider_payment_id == "pay-1"
                    && checkout.amount_kopecks == 79000
                    && !checkout.renewal
                    && checkout.expires_at - checkout.started_at == Duration::days(30)
            }))
            .times(1)
            .returning(|checkout| {
                let record = pending_record(&checkout);
                Box::pin(async move { Ok(record) })
            });

        let usecase = build(
            users,
            MockSubscriptionRepository::new(),
            basic_plans(),
            payments,
            gateway_creating("pay-1", false),
        );

        let link = usecase
            .create_checkout(321, UserProfile::default(), "Basic", false)
            .await
            .unwrap();

        assert_eq!(link.provider_payment_id, "pay-1");
        assert_eq!(link.amount_kopecks, 79000);
        assert!(!link.renewal);
        assert!(link.confirmation_url.contains("orderId=pay-1"));
    }

    #[tokio::test]
    async fn renewal_appends_to_the_remaining_days() {
        let (users, user_id) = users_returning(323);
        let now = Utc::now();
        let current = sample_subscription(
            user_id,
            PlanKind::Basic,
            SubscriptionStatus::Active,
            now - Duration::days(10),
            now + Duration::days(20),
        );
        let current_expiry = current.expires_at;

        let mut payments = MockPaymentRepository::new();
        payments
            .expect_create_pending_checkout()
            .with(function(move |checkout: &NewCheckout| {
                checkout.renewal && checkout.expires_at == current_expiry + Duration::days(30)
            }))
            .times(1)
            .returning(|checkout| {
                let record = pending_record(&checkout);
                Box::pin(async move { Ok(record) })
            });

        let usecase = build(
            users,
            active_subscriptions(Some(current)),
            basic_plans(),
            payments,
            gateway_creating("pay-renew", true),
        );

        let link = usecase
            .create_checkout(323, UserProfile::default(), "basic", true)
            .await
            .unwrap();
        assert!(link.renewal);
    }

    #[tokio::test]
    async fn renewal_needs_a_live_subscription_of_the_same_plan() {
        let (users, user_id) = users_returning(324);
        let now = Utc::now();
        let trial = sample_subscription(
            user_id,
            PlanKind::Trial,
            SubscriptionStatus::Active,
            now - Duration::hours(2),
            now + Duration::hours(22),
        );

        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_payment().never();

        let usecase = build(
            users,
            active_subscriptions(Some(trial)),
            basic_plans(),
            MockPaymentRepository::new(),
            gateway,
        );
        let err = usecase
            .create_checkout(324, UserProfile::default(), "basic", true)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));

        let (users, _) = users_returning(325);
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_create_payment().never();
        let usecase = build(
            users,
            active_subscriptions(None),
            basic_plans(),
            MockPaymentRepository::new(),
            gateway,
        );
        let err = usecase
            .create_checkout(325, UserProfile::default(), "basic", true)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NoActiveSubscription));
    }

    #[tokio::test]
    async fn provider_failure_records_nothing() {
        let (users, _) = users_returning(322);

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_payment()
            .returning(|_| Box::pin(async { Err(anyhow::anyhow!("yookassa request failed: 503")) }));

        let mut payments = MockPaymentRepository::new();
        payments.expect_create_pending_checkout().never();

        let usecase = build(
            users,
            MockSubscriptionRepository::new(),
            basic_plans(),
            payments,
            gateway,
        );

        let err = usecase
            .create_checkout(322, UserProfile::default(), "basic", false)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::TransientInfra(_)));
    }
}
