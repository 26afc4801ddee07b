use serde::{Deserialize, Serialize};

use crate::domain::value_objects::enums::{action_kinds::ActionKind, plan_kinds::PlanKind};

/// Raw quota value meaning "no limit" in `subscription_limits`.
pub const UNLIMITED_QUOTA: i32 = -1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Quota {
    Unlimited,
    Limited(u32),
}

impl Quota {
    /// `-1` is unlimited; any other negative value is treated as an empty quota.
    pub fn from_raw(raw: i32) -> Self {
        if raw == UNLIMITED_QUOTA {
            return Quota::Unlimited;
        }
        Quota::Limited(u32::try_from(raw).unwrap_or(0))
    }

    pub fn as_raw(&self) -> i32 {
        match self {
            Quota::Unlimited => UNLIMITED_QUOTA,
            Quota::Limited(limit) => i32::try_from(*limit).unwrap_or(i32::MAX),
        }
    }

    pub fn allows(&self, used: i64) -> bool {
        match self {
            Quota::Unlimited => true,
            Quota::Limited(limit) => used < i64::from(*limit),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanQuotas {
    pub consultations: Quota,
    pub documents: Quota,
    pub analyses: Quota,
}

impl PlanQuotas {
    pub fn for_action(&self, action: ActionKind) -> Quota {
        match action {
            ActionKind::Consultation => self.consultations,
            ActionKind::Document => self.documents,
            ActionKind::Analysis => self.analyses,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanDto {
    pub kind: PlanKind,
    pub title: String,
    pub price_kopecks: i32,
    pub duration_days: i32,
    pub quotas: PlanQuotas,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minus_one_is_unlimited() {
        let quota = Quota::from_raw(-1);
        assert_eq!(quota, Quota::Unlimited);
        assert!(quota.allows(i64::from(i32::MAX)));
    }

    #[test]
    fn limited_quota_allows_strictly_below_limit() {
        let quota = Quota::from_raw(25);
        assert!(quota.allows(24));
        assert!(!quota.allows(25));
        assert!(!quota.allows(26));
    }

    #[test]
    fn other_negative_values_grant_nothing() {
        let quota = Quota::from_raw(-5);
        assert_eq!(quota, Quota::Limited(0));
        assert!(!quota.allows(0));
    }
}
