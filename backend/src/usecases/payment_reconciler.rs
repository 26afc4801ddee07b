//! Applies payment provider notifications to the accounting state.
//!
//! Deliveries may be repeated or reordered. A cheap lookup answers obvious
//! duplicates early; the authoritative check happens again inside the
//! repository transaction with the payment row locked, so two concurrent
//! deliveries of the same `payment.succeeded` activate exactly once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jurist_core::domain::{
    entities::{payments::PaymentEntity, users::UserProfile},
    repositories::{
        notifications::NoticePublisher, payments::PaymentRepository, plans::PlanRepository,
        users::UserRepository,
    },
    value_objects::{
        enums::{
            payment_statuses::{PaymentStatus, PaymentTransition},
            plan_kinds::PlanKind,
        },
        ledger::{
            ActivationOutcome, PaymentActivation, PaymentOrigin, PaymentSettlement, RefundOutcome,
            SettlementOutcome,
        },
        notices::{NoticeKind, UserNotice},
        payment_webhook::{PaymentEventKind, PaymentWebhookNotification, PaymentWebhookObject},
    },
};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    errors::{BillingError, UseCaseResult},
    gateways::PaymentGateway,
};

/// What a notification did to the accounting state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ReconcileEffect {
    SubscriptionActivated {
        subscription_id: Uuid,
        expires_at: DateTime<Utc>,
    },
    PaymentSettled {
        status: PaymentStatus,
    },
    SubscriptionRevoked {
        subscription_id: Uuid,
    },
    /// Already applied earlier; nothing changed.
    Duplicate,
    /// Understood but requires no state change.
    Acknowledged,
}

/// Result of polling the provider for a payment the bot user is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSync {
    pub provider_payment_id: String,
    pub provider_status: String,
    pub status: PaymentStatus,
    pub effect: ReconcileEffect,
}

/// How the reconciler learned about a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Notification,
    /// Read from the provider API just now; no second lookup needed.
    Provider,
}

impl ReconcileEffect {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileEffect::SubscriptionActivated { .. } => "subscription_activated",
            ReconcileEffect::PaymentSettled { .. } => "payment_settled",
            ReconcileEffect::SubscriptionRevoked { .. } => "subscription_revoked",
            ReconcileEffect::Duplicate => "duplicate",
            ReconcileEffect::Acknowledged => "acknowledged",
        }
    }
}

pub struct PaymentReconciler<U, P, Pay, G, N>
where
    U: UserRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    N: NoticePublisher + Send + Sync + 'static,
{
    user_repo: Arc<U>,
    plan_repo: Arc<P>,
    payment_repo: Arc<Pay>,
    gateway: Arc<G>,
    notices: Arc<N>,
    verify_with_provider: bool,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

impl<U, P, Pay, G, N> PaymentReconciler<U, P, Pay, G, N>
where
    U: UserRepository + Send + Sync + 'static,
    P: PlanRepository + Send + Sync + 'static,
    Pay: PaymentRepository + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    N: NoticePublisher + Send + Sync + 'static,
{
    pub fn new(
        user_repo: Arc<U>,
        plan_repo: Arc<P>,
        payment_repo: Arc<Pay>,
        gateway: Arc<G>,
        notices: Arc<N>,
        verify_with_provider: bool,
    ) -> Self {
        Self {
            user_repo,
            plan_repo,
            payment_repo,
            gateway,
            notices,
            verify_with_provider,
        }
    }

    pub async fn handle_payment_event(
        &self,
        notification: PaymentWebhookNotification,
    ) -> UseCaseResult<ReconcileEffect> {
        let event = non_empty(notification.event.as_deref())
            .ok_or_else(|| BillingError::Validation("missing event".to_string()))?
            .to_string();
        let object = notification
            .object
            .ok_or_else(|| BillingError::Validation("missing object".to_string()))?;
        let object_id = non_empty(object.id.as_deref())
            .ok_or_else(|| BillingError::Validation("missing object.id".to_string()))?
            .to_string();

        info!(event = %event, object_id = %object_id, "reconciler: notification received");

        let effect = match PaymentEventKind::parse(&event) {
            PaymentEventKind::PaymentSucceeded => {
                self.on_succeeded(&object_id, &object, Source::Notification)
                    .await?
            }
            PaymentEventKind::PaymentCanceled => {
                self.on_canceled(&object_id, &object, Source::Notification)
                    .await?
            }
            PaymentEventKind::PaymentWaitingForCapture => {
                info!(
                    provider_payment_id = %object_id,
                    "reconciler: payment waiting for capture, nothing to do"
                );
                ReconcileEffect::Acknowledged
            }
            PaymentEventKind::RefundSucceeded => self.on_refund(&object_id, &object).await?,
            PaymentEventKind::Other(kind) => {
                warn!(event = %kind, object_id = %object_id, "reconciler: unhandled event kind");
                ReconcileEffect::Acknowledged
            }
        };

        info!(
            event = %event,
            object_id = %object_id,
            effect = effect.label(),
            "reconciler: notification applied"
        );
        Ok(effect)
    }

    /// Asks the provider about a payment the user started and applies the
    /// answer, for when the notification is late or lost. Only the buyer may
    /// poll; anyone else gets `NotFound`.
    pub async fn sync_payment(
        &self,
        telegram_id: i64,
        provider_payment_id: &str,
    ) -> UseCaseResult<PaymentSync> {
        let not_found = || BillingError::NotFound(format!("payment {provider_payment_id}"));

        let payment = self
            .find_payment(provider_payment_id)
            .await?
            .ok_or_else(not_found)?;
        let owner = self
            .user_repo
            .find_by_id(payment.user_id)
            .await
            .map_err(|err| {
                error!(user_id = %payment.user_id, db_error = ?err, "reconciler: failed to load payment owner");
                BillingError::TransientInfra(err)
            })?;
        if owner.map(|user| user.telegram_id) != Some(telegram_id) {
            warn!(%telegram_id, %provider_payment_id, "reconciler: sync requested by someone else");
            return Err(not_found());
        }

        if payment.status().is_terminal() {
            return Ok(PaymentSync {
                provider_payment_id: provider_payment_id.to_string(),
                provider_status: payment.status().as_str().to_string(),
                status: payment.status(),
                effect: ReconcileEffect::Duplicate,
            });
        }

        let polled = self
            .gateway
            .get_payment(provider_payment_id.to_string())
            .await
            .map_err(|err| {
                error!(%provider_payment_id, error = ?err, "reconciler: provider lookup failed");
                BillingError::TransientInfra(err)
            })?;
        let provider_status = polled.status.clone();
        let object = PaymentWebhookObject::from(polled);

        let effect = match provider_status.as_str() {
            "succeeded" => {
                self.on_succeeded(provider_payment_id, &object, Source::Provider)
                    .await?
            }
            "canceled" => {
                self.on_canceled(provider_payment_id, &object, Source::Provider)
                    .await?
            }
            other => {
                debug!(%provider_payment_id, provider_status = other, "reconciler: payment still open");
                ReconcileEffect::Acknowledged
            }
        };

        let status = match &effect {
            ReconcileEffect::SubscriptionActivated { .. } => PaymentStatus::Succeeded,
            ReconcileEffect::PaymentSettled { status } => *status,
            _ => self
                .find_payment(provider_payment_id)
                .await?
                .map(|payment| payment.status())
                .unwrap_or(PaymentStatus::Pending),
        };

        info!(
            %telegram_id,
            %provider_payment_id,
            provider_status = %provider_status,
            status = %status,
            effect = effect.label(),
            "reconciler: payment synced from provider"
        );
        Ok(PaymentSync {
            provider_payment_id: provider_payment_id.to_string(),
            provider_status,
            status,
            effect,
        })
    }

    async fn find_payment(&self, provider_payment_id: &str) -> UseCaseResult<Option<PaymentEntity>> {
        self.payment_repo
            .find_by_provider_payment_id(provider_payment_id.to_string())
            .await
            .map_err(|err| {
                error!(
                    %provider_payment_id,
                    db_error = ?err,
                    "reconciler: failed to look up payment"
                );
                BillingError::TransientInfra(err)
            })
    }

    /// Early answer for redeliveries. `None` means "go on and apply".
    fn precheck(
        &self,
        existing: Option<&PaymentEntity>,
        target: PaymentStatus,
    ) -> UseCaseResult<Option<ReconcileEffect>> {
        let Some(payment) = existing else {
            return Ok(None);
        };

        match payment.status().transition_to(target) {
            PaymentTransition::Apply => Ok(None),
            PaymentTransition::Duplicate => {
                info!(
                    provider_payment_id = %payment.provider_payment_id,
                    status = %target,
                    "reconciler: duplicate delivery, already applied"
                );
                Ok(Some(ReconcileEffect::Duplicate))
            }
            PaymentTransition::Illegal => Err(self.conflict(
                &payment.provider_payment_id,
                payment.status(),
                target,
            )),
        }
    }

    fn conflict(
        &self,
        provider_payment_id: &str,
        current: PaymentStatus,
        target: PaymentStatus,
    ) -> BillingError {
        warn!(
            %provider_payment_id,
            current = %current,
            incoming = %target,
            "reconciler: anomaly, terminal payment cannot change status"
        );
        BillingError::Conflict(format!(
            "payment {provider_payment_id} is already {current}, refusing {target}"
        ))
    }

    /// Re-reads the payment from the provider so a forged notification cannot
    /// grant access.
    async fn verify_status(
        &self,
        provider_payment_id: &str,
        expected: &str,
        source: Source,
    ) -> UseCaseResult<()> {
        if !self.verify_with_provider || source == Source::Provider {
            return Ok(());
        }

        let payment = self
            .gateway
            .get_payment(provider_payment_id.to_string())
            .await
            .map_err(|err| {
                error!(
                    %provider_payment_id,
                    error = ?err,
                    "reconciler: could not verify payment with provider"
                );
                BillingError::TransientInfra(err)
            })?;

        if payment.status != expected {
            warn!(
                %provider_payment_id,
                provider_status = %payment.status,
                expected,
                "reconciler: notification does not match provider state"
            );
            return Err(BillingError::Validation(format!(
                "provider reports payment {provider_payment_id} as {}",
                payment.status
            )));
        }
        Ok(())
    }

    async fn telegram_id_for(&self, user_id: Uuid, hint: Option<i64>) -> Option<i64> {
        if hint.is_some() {
            return hint;
        }
        match self.user_repo.find_by_id(user_id).await {
            Ok(user) => user.map(|user| user.telegram_id),
            Err(err) => {
                warn!(%user_id, db_error = ?err, "reconciler: cannot resolve notice recipient");
                None
            }
        }
    }

    async fn notify(&self, user_id: Uuid, hint: Option<i64>, kind: NoticeKind) {
        match self.telegram_id_for(user_id, hint).await {
            Some(telegram_id) => self.notices.publish(UserNotice { telegram_id, kind }),
            None => debug!(%user_id, notice = kind.label(), "reconciler: notice skipped"),
        }
    }

    async fn on_succeeded(
        &self,
        provider_payment_id: &str,
        object: &PaymentWebhookObject,
        source: Source,
    ) -> UseCaseResult<ReconcileEffect> {
        let telegram_id = object.telegram_id().ok_or_else(|| {
            BillingError::Validation("metadata.telegram_id missing or not an integer".to_string())
        })?;
        let plan_kind = object
            .metadata_string("subscription_type")
            .and_then(|raw| PlanKind::from_str(&raw))
            .filter(PlanKind::is_purchasable)
            .ok_or_else(|| {
                BillingError::Validation("metadata.subscription_type is not a paid plan".to_string())
            })?;

        let existing = self.find_payment(provider_payment_id).await?;
        if let Some(effect) = self.precheck(existing.as_ref(), PaymentStatus::Succeeded)? {
            return Ok(effect);
        }

        self.verify_status(provider_payment_id, "succeeded", source)
            .await?;

        let plan = self
            .plan_repo
            .find_by_kind(plan_kind)
            .await
            .map_err(|err| {
                error!(%plan_kind, db_error = ?err, "reconciler: failed to load plan");
                BillingError::TransientInfra(err)
            })?
            .ok_or_else(|| BillingError::Validation(format!("unknown plan {plan_kind}")))?;

        let amount_kopecks = match object.amount_kopecks() {
            Some(amount) if amount != plan.price_kopecks => {
                warn!(
                    %provider_payment_id,
                    %plan_kind,
                    paid = amount,
                    price = plan.price_kopecks,
                    "reconciler: paid amount differs from plan price"
                );
                amount
            }
            Some(amount) => amount,
            None => plan.price_kopecks,
        };

        let user = self
            .user_repo
            .get_or_create(telegram_id, UserProfile::default())
            .await
            .map_err(|err| {
                error!(%telegram_id, db_error = ?err, "reconciler: failed to upsert user");
                BillingError::TransientInfra(err)
            })?;

        let outcome = self
            .payment_repo
            .apply_payment_succeeded(PaymentActivation {
                user_id: user.id,
                plan_kind,
                provider_payment_id: provider_payment_id.to_string(),
                amount_kopecks,
                duration_days: plan.duration_days,
                renewal: object.metadata_string("renewal").as_deref() == Some("true"),
                now: Utc::now(),
            })
            .await
            .map_err(|err| {
                error!(
                    %provider_payment_id,
                    %telegram_id,
                    db_error = ?err,
                    "reconciler: activation transaction failed"
                );
                BillingError::TransientInfra(err)
            })?;

        match outcome {
            ActivationOutcome::Activated {
                payment,
                subscription,
                superseded,
            } => {
                info!(
                    %provider_payment_id,
                    %telegram_id,
                    %plan_kind,
                    subscription_id = %subscription.id,
                    expires_at = %subscription.expires_at,
                    superseded = superseded.len(),
                    amount_kopecks = payment.amount_kopecks,
                    "reconciler: subscription activated"
                );
                self.notices.publish(UserNotice {
                    telegram_id,
                    kind: NoticeKind::SubscriptionActivated {
                        plan_kind,
                        expires_at: subscription.expires_at,
                    },
                });
                Ok(ReconcileEffect::SubscriptionActivated {
                    subscription_id: subscription.id,
                    expires_at: subscription.expires_at,
                })
            }
            ActivationOutcome::AlreadyApplied => {
                info!(%provider_payment_id, "reconciler: activation already applied by a concurrent delivery");
                Ok(ReconcileEffect::Duplicate)
            }
            ActivationOutcome::Rejected { current } => {
                Err(self.conflict(provider_payment_id, current, PaymentStatus::Succeeded))
            }
        }
    }

    async fn on_canceled(
        &self,
        provider_payment_id: &str,
        object: &PaymentWebhookObject,
        source: Source,
    ) -> UseCaseResult<ReconcileEffect> {
        let target = object.cancellation_status();
        let telegram_hint = object.telegram_id();

        let existing = self.find_payment(provider_payment_id).await?;
        if let Some(effect) = self.precheck(existing.as_ref(), target)? {
            return Ok(effect);
        }

        self.verify_status(provider_payment_id, "canceled", source)
            .await?;

        let origin = match (&existing, telegram_hint) {
            (None, Some(telegram_id)) => self.origin_of(telegram_id, object).await?,
            _ => None,
        };

        let outcome = self
            .payment_repo
            .settle_payment(PaymentSettlement {
                provider_payment_id: provider_payment_id.to_string(),
                target,
                origin,
                now: Utc::now(),
            })
            .await
            .map_err(|err| {
                error!(
                    %provider_payment_id,
                    db_error = ?err,
                    "reconciler: settlement transaction failed"
                );
                BillingError::TransientInfra(err)
            })?;

        match outcome {
            SettlementOutcome::Settled {
                payment,
                cancelled_subscription,
            } => {
                let reason = object
                    .cancellation_details
                    .as_ref()
                    .and_then(|details| details.reason.clone());
                info!(
                    %provider_payment_id,
                    status = %target,
                    reason = ?reason,
                    cancelled_subscription = ?cancelled_subscription,
                    "reconciler: payment settled without activation"
                );

                if let Some(plan_kind) = payment.plan_kind() {
                    let kind = match target {
                        PaymentStatus::Failed => NoticeKind::PaymentFailed { plan_kind },
                        _ => NoticeKind::PaymentCancelled { plan_kind },
                    };
                    self.notify(payment.user_id, telegram_hint, kind).await;
                }
                Ok(ReconcileEffect::PaymentSettled { status: target })
            }
            SettlementOutcome::AlreadySettled => Ok(ReconcileEffect::Duplicate),
            SettlementOutcome::Rejected { current } => {
                Err(self.conflict(provider_payment_id, current, target))
            }
            SettlementOutcome::UnknownPayment => {
                warn!(
                    %provider_payment_id,
                    "reconciler: cancellation for a payment we never recorded"
                );
                Ok(ReconcileEffect::Acknowledged)
            }
        }
    }

    /// Enough to record a cancellation for a payment that has no local row.
    async fn origin_of(
        &self,
        telegram_id: i64,
        object: &PaymentWebhookObject,
    ) -> UseCaseResult<Option<PaymentOrigin>> {
        let Some(plan_kind) = object
            .metadata_string("subscription_type")
            .and_then(|raw| PlanKind::from_str(&raw))
        else {
            return Ok(None);
        };

        let user = self
            .user_repo
            .get_or_create(telegram_id, UserProfile::default())
            .await
            .map_err(|err| {
                error!(%telegram_id, db_error = ?err, "reconciler: failed to upsert user");
                BillingError::TransientInfra(err)
            })?;

        Ok(Some(PaymentOrigin {
            user_id: user.id,
            plan_kind,
            amount_kopecks: object.amount_kopecks().unwrap_or_default(),
        }))
    }

    async fn on_refund(
        &self,
        refund_id: &str,
        object: &PaymentWebhookObject,
    ) -> UseCaseResult<ReconcileEffect> {
        let provider_payment_id = non_empty(object.payment_id.as_deref())
            .ok_or_else(|| BillingError::Validation("refund without object.payment_id".to_string()))?
            .to_string();

        let outcome = self
            .payment_repo
            .apply_refund(provider_payment_id.clone(), Utc::now())
            .await
            .map_err(|err| {
                error!(
                    %refund_id,
                    %provider_payment_id,
                    db_error = ?err,
                    "reconciler: refund transaction failed"
                );
                BillingError::TransientInfra(err)
            })?;

        match outcome {
            RefundOutcome::Cancelled {
                payment,
                subscription,
            } => {
                info!(
                    %refund_id,
                    %provider_payment_id,
                    subscription_id = %subscription.id,
                    "reconciler: subscription revoked after refund"
                );
                if let Some(plan_kind) = subscription.plan_kind() {
                    self.notify(
                        payment.user_id,
                        object.telegram_id(),
                        NoticeKind::SubscriptionRefunded { plan_kind },
                    )
                    .await;
                }
                Ok(ReconcileEffect::SubscriptionRevoked {
                    subscription_id: subscription.id,
                })
            }
            RefundOutcome::AlreadyCancelled => {
                info!(%refund_id, %provider_payment_id, "reconciler: refunded subscription already cancelled");
                Ok(ReconcileEffect::Duplicate)
            }
            RefundOutcome::NoSubscription => {
                info!(%refund_id, %provider_payment_id, "reconciler: refunded payment had no subscription");
                Ok(ReconcileEffect::Acknowledged)
            }
            RefundOutcome::UnknownPayment => {
                warn!(%refund_id, %provider_payment_id, "reconciler: refund for unknown payment");
                Ok(ReconcileEffect::Acknowledged)
            }
        }
    }
}
