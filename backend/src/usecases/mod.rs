pub mod checkout;
pub mod consultations;
pub mod errors;
pub mod gateways;
pub mod health;
pub mod payment_reconciler;
pub mod subscription_ledger;
pub mod usage_meter;
