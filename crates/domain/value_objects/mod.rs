pub mod enums;
pub mod ledger;
pub mod notices;
pub mod payment_webhook;
pub mod plans;
pub mod subscriptions;
