use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Cancelled,
    Failed,
}

/// What applying an incoming status to a stored payment row amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTransition {
    /// `pending` moving to a terminal status, or staying pending.
    Apply,
    /// The row already carries the requested terminal status.
    Duplicate,
    /// The row is terminal with a different status; must not be rewritten.
    Illegal,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PaymentStatus::Pending),
            "succeeded" => Some(PaymentStatus::Succeeded),
            "cancelled" | "canceled" => Some(PaymentStatus::Cancelled),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn transition_to(&self, target: PaymentStatus) -> PaymentTransition {
        match (self, target) {
            (PaymentStatus::Pending, PaymentStatus::Pending) => PaymentTransition::Duplicate,
            (PaymentStatus::Pending, _) => PaymentTransition::Apply,
            (current, target) if *current == target => PaymentTransition::Duplicate,
            _ => PaymentTransition::Illegal,
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
