//! Commands and outcomes exchanged with the transactional repositories.
//!
//! Every multi-row mutation of the accounting state happens inside one
//! database transaction; these types describe what to do and what actually
//! happened once the row locks were held.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    entities::{payments::PaymentEntity, subscriptions::SubscriptionEntity},
    value_objects::enums::{
        action_kinds::ActionKind, payment_statuses::PaymentStatus, plan_kinds::PlanKind,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct NewCheckout {
    pub user_id: Uuid,
    pub plan_kind: PlanKind,
    pub provider_payment_id: String,
    pub amount_kopecks: i32,
    pub confirmation_url: Option<String>,
    pub renewal: bool,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRecord {
    pub subscription: SubscriptionEntity,
    pub payment: PaymentEntity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentActivation {
    pub user_id: Uuid,
    pub plan_kind: PlanKind,
    pub provider_payment_id: String,
    pub amount_kopecks: i32,
    pub duration_days: i32,
    /// Used only when no local row exists yet; a stored row keeps its own flag.
    pub renewal: bool,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivationOutcome {
    Activated {
        payment: PaymentEntity,
        subscription: SubscriptionEntity,
        /// Active subscriptions of the same user closed by this activation.
        superseded: Vec<Uuid>,
    },
    /// The payment was already `succeeded` when the row lock was taken.
    AlreadyApplied,
    /// The payment is locked in a different terminal status.
    Rejected { current: PaymentStatus },
}

/// Where a payment came from, used when a terminal notification references a
/// payment that was never recorded locally.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOrigin {
    pub user_id: Uuid,
    pub plan_kind: PlanKind,
    pub amount_kopecks: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSettlement {
    pub provider_payment_id: String,
    pub target: PaymentStatus,
    pub origin: Option<PaymentOrigin>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Settled {
        payment: PaymentEntity,
        cancelled_subscription: Option<Uuid>,
    },
    AlreadySettled,
    Rejected { current: PaymentStatus },
    /// Nothing recorded and nothing to record it from.
    UnknownPayment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefundOutcome {
    Cancelled {
        payment: PaymentEntity,
        subscription: SubscriptionEntity,
    },
    AlreadyCancelled,
    NoSubscription,
    UnknownPayment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrialActivation {
    Started {
        subscription: SubscriptionEntity,
        superseded: Vec<Uuid>,
    },
    AlreadyUsed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUsageEvent {
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub action: ActionKind,
    pub details: serde_json::Value,
    /// Same clock as the subscription window the event is counted against.
    pub recorded_at: DateTime<Utc>,
}
