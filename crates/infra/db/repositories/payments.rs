use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::{PgConnection, QueryResult, RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{
        entities::{
            payments::{InsertPaymentEntity, PaymentEntity},
            subscriptions::{InsertSubscriptionEntity, SubscriptionEntity},
        },
        repositories::payments::PaymentRepository,
        value_objects::{
            enums::{
                payment_statuses::{PaymentStatus, PaymentTransition},
                subscription_statuses::SubscriptionStatus,
            },
            ledger::{
                ActivationOutcome, CheckoutRecord, NewCheckout, PaymentActivation,
                PaymentSettlement, RefundOutcome, SettlementOutcome,
            },
        },
    },
    infra::db::{
        postgres::{
            postgres_connection::PgPoolSquad,
            schema::{payments, subscriptions},
        },
        repositories::subscription_rows::{
            detach_from_users, lock_user, point_user_at, renewal_base, supersede_active,
        },
    },
};

pub struct PaymentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

fn lock_payment(
    tx: &mut PgConnection,
    provider_payment_id: &str,
) -> QueryResult<Option<PaymentEntity>> {
    payments::table
        .filter(payments::provider_payment_id.eq(provider_payment_id))
        .select(PaymentEntity::as_select())
        .for_update()
        .first::<PaymentEntity>(tx)
        .optional()
}

fn activate(
    tx: &mut PgConnection,
    activation: PaymentActivation,
) -> QueryResult<ActivationOutcome> {
    let now = activation.now;

    insert_into(payments::table)
        .values(&InsertPaymentEntity {
            user_id: activation.user_id,
            subscription_id: None,
            plan_kind: activation.plan_kind.as_str().to_string(),
            provider_payment_id: activation.provider_payment_id.clone(),
            amount_kopecks: activation.amount_kopecks,
            status: PaymentStatus::Pending.as_str().to_string(),
            confirmation_url: None,
            renewal: activation.renewal,
        })
        .on_conflict(payments::provider_payment_id)
        .do_nothing()
        .execute(tx)?;

    let Some(payment) = lock_payment(tx, &activation.provider_payment_id)? else {
        return Err(diesel::result::Error::NotFound);
    };

    match payment.status().transition_to(PaymentStatus::Succeeded) {
        PaymentTransition::Apply => {}
        PaymentTransition::Duplicate => return Ok(ActivationOutcome::AlreadyApplied),
        PaymentTransition::Illegal => {
            return Ok(ActivationOutcome::Rejected {
                current: payment.status(),
            });
        }
    }

    lock_user(tx, payment.user_id)?;
    let window_base = if payment.renewal {
        renewal_base(tx, payment.user_id, &payment.plan_kind, now)?
    } else {
        now
    };
    let superseded = supersede_active(tx, payment.user_id, now)?;
    let expires_at = window_base + Duration::days(i64::from(activation.duration_days));

    let linked_pending = match payment.subscription_id {
        Some(subscription_id) => subscriptions::table
            .find(subscription_id)
            .filter(subscriptions::status.eq(SubscriptionStatus::Pending.as_str()))
            .select(SubscriptionEntity::as_select())
            .for_update()
            .first::<SubscriptionEntity>(tx)
            .optional()?,
        None => None,
    };

    let subscription = match linked_pending {
        Some(pending) => update(subscriptions::table.find(pending.id))
            .set((
                subscriptions::status.eq(SubscriptionStatus::Active.as_str()),
                subscriptions::plan_kind.eq(payment.plan_kind.clone()),
                subscriptions::started_at.eq(now),
                subscriptions::expires_at.eq(expires_at),
                subscriptions::provider_payment_id.eq(Some(payment.provider_payment_id.clone())),
                subscriptions::auto_renewal.eq(true),
                subscriptions::updated_at.eq(now),
            ))
            .returning(SubscriptionEntity::as_returning())
            .get_result::<SubscriptionEntity>(tx)?,
        None => insert_into(subscriptions::table)
            .values(&InsertSubscriptionEntity {
                user_id: payment.user_id,
                plan_kind: payment.plan_kind.clone(),
                status: SubscriptionStatus::Active.as_str().to_string(),
                started_at: now,
                expires_at,
                provider_payment_id: Some(payment.provider_payment_id.clone()),
                auto_renewal: true,
            })
            .returning(SubscriptionEntity::as_returning())
            .get_result::<SubscriptionEntity>(tx)?,
    };

    let payment = update(payments::table.find(payment.id))
        .set((
            payments::status.eq(PaymentStatus::Succeeded.as_str()),
            payments::subscription_id.eq(Some(subscription.id)),
            payments::updated_at.eq(now),
        ))
        .returning(PaymentEntity::as_returning())
        .get_result::<PaymentEntity>(tx)?;

    point_user_at(tx, payment.user_id, Some(subscription.id), now)?;

    Ok(ActivationOutcome::Activated {
        payment,
        subscription,
        superseded,
    })
}

fn settle(tx: &mut PgConnection, settlement: PaymentSettlement) -> QueryResult<SettlementOutcome> {
    let now = settlement.now;
    let target = settlement.target;

    let payment = match (lock_payment(tx, &settlement.provider_payment_id)?, settlement.origin) {
        (Some(payment), _) => payment,
        (None, Some(origin)) => {
            let inserted = insert_into(payments::table)
                .values(&InsertPaymentEntity {
                    user_id: origin.user_id,
                    subscription_id: None,
                    plan_kind: origin.plan_kind.as_str().to_string(),
                    provider_payment_id: settlement.provider_payment_id.clone(),
                    amount_kopecks: origin.amount_kopecks,
                    status: target.as_str().to_string(),
                    confirmation_url: None,
                    renewal: false,
                })
                .on_conflict(payments::provider_payment_id)
                .do_nothing()
                .returning(PaymentEntity::as_returning())
                .get_result::<PaymentEntity>(tx)
                .optional()?;

            match inserted {
                Some(payment) => {
                    return Ok(SettlementOutcome::Settled {
                        payment,
                        cancelled_subscription: None,
                    });
                }
                // Lost the insert race; settle against the winner's row.
                None => lock_payment(tx, &settlement.provider_payment_id)?
                    .ok_or(diesel::result::Error::NotFound)?,
            }
        }
        (None, None) => return Ok(SettlementOutcome::UnknownPayment),
    };

    match payment.status().transition_to(target) {
        PaymentTransition::Apply => {}
        PaymentTransition::Duplicate => return Ok(SettlementOutcome::AlreadySettled),
        PaymentTransition::Illegal => {
            return Ok(SettlementOutcome::Rejected {
                current: payment.status(),
            });
        }
    }

    let payment = update(payments::table.find(payment.id))
        .set((
            payments::status.eq(target.as_str()),
            payments::updated_at.eq(now),
        ))
        .returning(PaymentEntity::as_returning())
        .get_result::<PaymentEntity>(tx)?;

    let cancelled_subscription = match payment.subscription_id {
        Some(subscription_id) => update(subscriptions::table.find(subscription_id))
            .filter(subscriptions::status.eq(SubscriptionStatus::Pending.as_str()))
            .set((
                subscriptions::status.eq(SubscriptionStatus::Cancelled.as_str()),
                subscriptions::cancelled_at.eq(Some(now)),
                subscriptions::updated_at.eq(now),
            ))
            .returning(subscriptions::id)
            .get_result::<Uuid>(tx)
            .optional()?,
        None => None,
    };

    Ok(SettlementOutcome::Settled {
        payment,
        cancelled_subscription,
    })
}

fn refund(
    tx: &mut PgConnection,
    provider_payment_id: &str,
    now: DateTime<Utc>,
) -> QueryResult<RefundOutcome> {
    let Some(payment) = lock_payment(tx, provider_payment_id)? else {
        return Ok(RefundOutcome::UnknownPayment);
    };
    let Some(subscription_id) = payment.subscription_id else {
        return Ok(RefundOutcome::NoSubscription);
    };
    lock_user(tx, payment.user_id)?;

    let subscription = subscriptions::table
        .find(subscription_id)
        .select(SubscriptionEntity::as_select())
        .for_update()
        .first::<SubscriptionEntity>(tx)?;

    if subscription.status() == SubscriptionStatus::Cancelled {
        return Ok(RefundOutcome::AlreadyCancelled);
    }

    let subscription = update(subscriptions::table.find(subscription.id))
        .set((
            subscriptions::status.eq(SubscriptionStatus::Cancelled.as_str()),
            subscriptions::cancelled_at.eq(Some(now)),
            subscriptions::auto_renewal.eq(false),
            subscriptions::updated_at.eq(now),
        ))
        .returning(SubscriptionEntity::as_returning())
        .get_result::<SubscriptionEntity>(tx)?;

    detach_from_users(tx, subscription.id, now)?;

    Ok(RefundOutcome::Cancelled {
        payment,
        subscription,
    })
}

#[async_trait]
impl PaymentRepository for PaymentPostgres {
    async fn find_by_provider_payment_id(
        &self,
        provider_payment_id: String,
    ) -> Result<Option<PaymentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<PaymentEntity>> {
            let mut conn = db_pool.get()?;

            let payment = payments::table
                .filter(payments::provider_payment_id.eq(&provider_payment_id))
                .select(PaymentEntity::as_select())
                .first::<PaymentEntity>(&mut conn)
                .optional()?;

            Ok(payment)
        })
        .await??)
    }

    async fn create_pending_checkout(&self, checkout: NewCheckout) -> Result<CheckoutRecord> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<CheckoutRecord> {
            let mut conn = db_pool.get()?;

            let record = conn.transaction::<CheckoutRecord, diesel::result::Error, _>(|tx| {
                let subscription = insert_into(subscriptions::table)
                    .values(&InsertSubscriptionEntity {
                        user_id: checkout.user_id,
                        plan_kind: checkout.plan_kind.as_str().to_string(),
                        status: SubscriptionStatus::Pending.as_str().to_string(),
                        started_at: checkout.started_at,
                        expires_at: checkout.expires_at,
                        provider_payment_id: Some(checkout.provider_payment_id.clone()),
                        auto_renewal: false,
                    })
                    .returning(SubscriptionEntity::as_returning())
                    .get_result::<SubscriptionEntity>(tx)?;

                let payment = insert_into(payments::table)
                    .values(&InsertPaymentEntity {
                        user_id: checkout.user_id,
                        subscription_id: Some(subscription.id),
                        plan_kind: checkout.plan_kind.as_str().to_string(),
                        provider_payment_id: checkout.provider_payment_id.clone(),
                        amount_kopecks: checkout.amount_kopecks,
                        status: PaymentStatus::Pending.as_str().to_string(),
                        confirmation_url: checkout.confirmation_url.clone(),
                        renewal: checkout.renewal,
                    })
                    .returning(PaymentEntity::as_returning())
                    .get_result::<PaymentEntity>(tx)?;

                Ok(CheckoutRecord {
                    subscription,
                    payment,
                })
            })?;

            Ok(record)
        })
        .await??)
    }

    async fn apply_payment_succeeded(
        &self,
        activation: PaymentActivation,
    ) -> Result<ActivationOutcome> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<ActivationOutcome> {
            let mut conn = db_pool.get()?;
            let outcome = conn
                .transaction::<ActivationOutcome, diesel::result::Error, _>(|tx| {
                    activate(tx, activation)
                })?;
            Ok(outcome)
        })
        .await??)
    }

    async fn settle_payment(&self, settlement: PaymentSettlement) -> Result<SettlementOutcome> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<SettlementOutcome> {
            let mut conn = db_pool.get()?;
            let outcome = conn
                .transaction::<SettlementOutcome, diesel::result::Error, _>(|tx| {
                    settle(tx, settlement)
                })?;
            Ok(outcome)
        })
        .await??)
    }

    async fn apply_refund(
        &self,
        provider_payment_id: String,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<RefundOutcome> {
            let mut conn = db_pool.get()?;
            let outcome = conn.transaction::<RefundOutcome, diesel::result::Error, _>(|tx| {
                refund(tx, &provider_payment_id, now)
            })?;
            Ok(outcome)
        })
        .await??)
    }
}
