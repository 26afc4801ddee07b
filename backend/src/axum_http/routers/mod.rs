pub mod consultations;
pub mod health;
pub mod payment_webhook;
pub mod subscriptions;
pub mod usage;
