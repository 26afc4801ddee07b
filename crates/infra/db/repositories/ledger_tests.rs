//! Ledger transactions against a live Postgres. Run with
//! `DATABASE_URL=postgres://... cargo test -p jurist_core -- --ignored`
//! on a disposable database; the billing schema is created when missing.

use std::sync::{Arc, Once};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use diesel::{
    connection::SimpleConnection, prelude::*, sql_query, sql_types::Bool,
};
use uuid::Uuid;

use crate::{
    domain::{
        entities::{subscriptions::SubscriptionEntity, users::UserProfile},
        repositories::{
            payments::PaymentRepository, subscriptions::SubscriptionRepository,
            users::UserRepository,
        },
        value_objects::{
            enums::plan_kinds::PlanKind,
            ledger::{ActivationOutcome, PaymentActivation, RefundOutcome, TrialActivation},
        },
    },
    infra::db::{
        postgres::{
            postgres_connection::{establish_connection, PgPoolSquad, PoolSettings},
            schema::subscriptions,
        },
        repositories::{
            payments::PaymentPostgres, subscriptions::SubscriptionPostgres, users::UserPostgres,
        },
    },
};

const NEEDS_DB: &str = "needs DATABASE_URL pointing at a disposable Postgres";

static SCHEMA: Once = Once::new();

#[derive(QueryableByName)]
struct SchemaPresent {
    #[diesel(sql_type = Bool)]
    present: bool,
}

fn pool() -> Arc<PgPoolSquad> {
    let url = std::env::var("DATABASE_URL").expect(NEEDS_DB);
    let pool = establish_connection(
        &url,
        &PoolSettings {
            max_size: 8,
            ..PoolSettings::default()
        },
    )
    .unwrap();

    SCHEMA.call_once(|| {
        let mut conn = pool.get().unwrap();
        let schema = sql_query("SELECT to_regclass('public.subscriptions') IS NOT NULL AS present")
            .get_result::<SchemaPresent>(&mut conn)
            .unwrap();
        if !schema.present {
            conn.batch_execute(include_str!(
                "../../../../migrations/2025-06-01-000000_init_billing/up.sql"
            ))
            .unwrap();
        }
    });

    Arc::new(pool)
}

struct Ledger {
    pool: Arc<PgPoolSquad>,
    users: UserPostgres,
    subscriptions: SubscriptionPostgres,
    payments: PaymentPostgres,
}

impl Ledger {
    fn connect() -> Self {
        let pool = pool();
        Self {
            users: UserPostgres::new(Arc::clone(&pool)),
            subscriptions: SubscriptionPostgres::new(Arc::clone(&pool)),
            payments: PaymentPostgres::new(Arc::clone(&pool)),
            pool,
        }
    }

    async fn fresh_user(&self) -> Uuid {
        let telegram_id = (Uuid::new_v4().as_u128() >> 65) as i64;
        self.users
            .get_or_create(telegram_id, UserProfile::default())
            .await
            .unwrap()
            .id
    }

    fn active_rows(&self, user_id: Uuid) -> Vec<SubscriptionEntity> {
        let mut conn = self.pool.get().unwrap();
        subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::status.eq("active"))
            .select(SubscriptionEntity::as_select())
            .load(&mut conn)
            .unwrap()
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

fn basic_payment(user_id: Uuid, provider_payment_id: &str, at: DateTime<Utc>) -> PaymentActivation {
    PaymentActivation {
        user_id,
        plan_kind: PlanKind::Basic,
        provider_payment_id: provider_payment_id.to_string(),
        amount_kopecks: 49_900,
        duration_days: 30,
        renewal: false,
        now: at,
    }
}

fn provider_id() -> String {
    format!("pay-{}", Uuid::new_v4())
}

#[tokio::test]
#[ignore = "needs DATABASE_URL pointing at a disposable Postgres"]
async fn succeeded_payment_opens_a_thirty_day_window() {
    let ledger = Ledger::connect();
    let user_id = ledger.fresh_user().await;
    let at = now();

    let outcome = ledger
        .payments
        .apply_payment_succeeded(basic_payment(user_id, &provider_id(), at))
        .await
        .unwrap();

    let ActivationOutcome::Activated { subscription, .. } = outcome else {
        panic!("expected activation, got {outcome:?}");
    };
    assert_eq!(subscription.started_at, at);
    assert_eq!(subscription.expires_at, at + Duration::days(30));
    assert_eq!(subscription.plan_kind, "basic");

    let user = ledger.users.find_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(user.current_subscription_id, Some(subscription.id));
}

#[tokio::test]
#[ignore = "needs DATABASE_URL pointing at a disposable Postgres"]
async fn redelivered_success_activates_once() {
    let ledger = Arc::new(Ledger::connect());
    let user_id = ledger.fresh_user().await;
    let payment_id = provider_id();
    let at = now();

    let first = ledger
        .payments
        .apply_payment_succeeded(basic_payment(user_id, &payment_id, at))
        .await
        .unwrap();
    assert!(matches!(first, ActivationOutcome::Activated { .. }));

    let again = ledger
        .payments
        .apply_payment_succeeded(basic_payment(user_id, &payment_id, at))
        .await
        .unwrap();
    assert_eq!(again, ActivationOutcome::AlreadyApplied);
    assert_eq!(ledger.active_rows(user_id).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs DATABASE_URL pointing at a disposable Postgres"]
async fn concurrent_redelivery_activates_once() {
    let ledger = Arc::new(Ledger::connect());
    let user_id = ledger.fresh_user().await;
    let payment_id = provider_id();
    let at = now();

    let deliveries = (0..8).map(|_| {
        let ledger = Arc::clone(&ledger);
        let activation = basic_payment(user_id, &payment_id, at);
        tokio::spawn(async move { ledger.payments.apply_payment_succeeded(activation).await })
    });

    let mut activated = 0;
    for delivery in deliveries.collect::<Vec<_>>() {
        match delivery.await.unwrap().unwrap() {
            ActivationOutcome::Activated { .. } => activated += 1,
            ActivationOutcome::AlreadyApplied => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(activated, 1);
    assert_eq!(ledger.active_rows(user_id).len(), 1);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL pointing at a disposable Postgres"]
async fn refund_cancels_and_detaches_once() {
    let ledger = Ledger::connect();
    let user_id = ledger.fresh_user().await;
    let payment_id = provider_id();
    let at = now();

    ledger
        .payments
        .apply_payment_succeeded(basic_payment(user_id, &payment_id, at))
        .await
        .unwrap();

    let refunded = ledger
        .payments
        .apply_refund(payment_id.clone(), at + Duration::days(2))
        .await
        .unwrap();
    let RefundOutcome::Cancelled { subscription, .. } = refunded else {
        panic!("expected cancellation, got {refunded:?}");
    };
    assert_eq!(subscription.status, "cancelled");
    assert_eq!(subscription.cancelled_at, Some(at + Duration::days(2)));

    let user = ledger.users.find_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(user.current_subscription_id, None);
    assert!(ledger.active_rows(user_id).is_empty());

    let again = ledger
        .payments
        .apply_refund(payment_id, at + Duration::days(3))
        .await
        .unwrap();
    assert_eq!(again, RefundOutcome::AlreadyCancelled);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL pointing at a disposable Postgres"]
async fn purchase_after_trial_leaves_one_active_row() {
    let ledger = Ledger::connect();
    let user_id = ledger.fresh_user().await;
    let at = now();

    let trial = ledger
        .subscriptions
        .start_trial(user_id, 3, at)
        .await
        .unwrap();
    let TrialActivation::Started {
        subscription: trial, ..
    } = trial
    else {
        panic!("expected a fresh trial, got {trial:?}");
    };

    let outcome = ledger
        .payments
        .apply_payment_succeeded(basic_payment(user_id, &provider_id(), at + Duration::hours(1)))
        .await
        .unwrap();
    let ActivationOutcome::Activated {
        subscription,
        superseded,
        ..
    } = outcome
    else {
        panic!("expected activation, got {outcome:?}");
    };

    assert_eq!(superseded, vec![trial.id]);
    let active = ledger.active_rows(user_id);
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, subscription.id);
}

#[tokio::test]
#[ignore = "needs DATABASE_URL pointing at a disposable Postgres"]
async fn renewal_carries_the_remaining_days() {
    let ledger = Ledger::connect();
    let user_id = ledger.fresh_user().await;
    let at = now();

    let first = ledger
        .payments
        .apply_payment_succeeded(basic_payment(user_id, &provider_id(), at))
        .await
        .unwrap();
    let ActivationOutcome::Activated {
        subscription: current,
        ..
    } = first
    else {
        panic!("expected activation, got {first:?}");
    };

    let renewal = PaymentActivation {
        renewal: true,
        ..basic_payment(user_id, &provider_id(), at + Duration::days(10))
    };
    let outcome = ledger.payments.apply_payment_succeeded(renewal).await.unwrap();
    let ActivationOutcome::Activated {
        subscription,
        superseded,
        ..
    } = outcome
    else {
        panic!("expected activation, got {outcome:?}");
    };

    assert_eq!(superseded, vec![current.id]);
    assert_eq!(subscription.started_at, at + Duration::days(10));
    assert_eq!(subscription.expires_at, current.expires_at + Duration::days(30));
    assert_eq!(ledger.active_rows(user_id).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs DATABASE_URL pointing at a disposable Postgres"]
async fn refund_activation_and_cancel_race_without_deadlock() {
    let ledger = Arc::new(Ledger::connect());
    let user_id = ledger.fresh_user().await;

    for round in 0..10 {
        let at = now() + Duration::minutes(round);
        let refunded_id = provider_id();
        ledger
            .payments
            .apply_payment_succeeded(basic_payment(user_id, &refunded_id, at))
            .await
            .unwrap();

        let refund = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.payments.apply_refund(refunded_id, at).await.map(|_| ()) })
        };
        let activate = {
            let ledger = Arc::clone(&ledger);
            let activation = basic_payment(user_id, &provider_id(), at);
            tokio::spawn(async move {
                ledger
                    .payments
                    .apply_payment_succeeded(activation)
                    .await
                    .map(|_| ())
            })
        };
        let cancel = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger
                    .subscriptions
                    .cancel_active(user_id, at)
                    .await
                    .map(|_| ())
            })
        };

        let (refund, activate, cancel) = tokio::join!(refund, activate, cancel);
        refund.unwrap().unwrap();
        activate.unwrap().unwrap();
        cancel.unwrap().unwrap();

        assert!(ledger.active_rows(user_id).len() <= 1);
    }
}
