pub mod payments;
pub mod plans;
pub mod subscription_rows;
pub mod subscriptions;
pub mod usage;
pub mod users;

#[cfg(test)]
mod ledger_tests;
