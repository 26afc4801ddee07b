pub mod action_kinds;
pub mod payment_statuses;
pub mod plan_kinds;
pub mod subscription_statuses;
