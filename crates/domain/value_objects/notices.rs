use chrono::{DateTime, Utc};

use crate::domain::value_objects::enums::plan_kinds::PlanKind;

/// Message addressed to a bot user after an accounting change has been committed.
#[derive(Debug, Clone, PartialEq)]
pub struct UserNotice {
    pub telegram_id: i64,
    pub kind: NoticeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoticeKind {
    SubscriptionActivated {
        plan_kind: PlanKind,
        expires_at: DateTime<Utc>,
    },
    PaymentCancelled {
        plan_kind: PlanKind,
    },
    PaymentFailed {
        plan_kind: PlanKind,
    },
    SubscriptionRefunded {
        plan_kind: PlanKind,
    },
}

impl NoticeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NoticeKind::SubscriptionActivated { .. } => "subscription_activated",
            NoticeKind::PaymentCancelled { .. } => "payment_cancelled",
            NoticeKind::PaymentFailed { .. } => "payment_failed",
            NoticeKind::SubscriptionRefunded { .. } => "subscription_refunded",
        }
    }
}
