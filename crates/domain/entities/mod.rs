pub mod payments;
pub mod plans;
pub mod subscriptions;
pub mod usage_log;
pub mod users;
