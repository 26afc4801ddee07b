pub mod notifications;
pub mod payments;
pub mod plans;
pub mod subscriptions;
pub mod usage;
pub mod users;
