use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;

use crate::domain::{
    entities::payments::PaymentEntity,
    value_objects::ledger::{
        ActivationOutcome, CheckoutRecord, NewCheckout, PaymentActivation, PaymentSettlement,
        RefundOutcome, SettlementOutcome,
    },
};

#[async_trait]
#[automock]
pub trait PaymentRepository {
    async fn find_by_provider_payment_id(
        &self,
        provider_payment_id: String,
    ) -> Result<Option<PaymentEntity>>;

    /// Inserts the pending subscription and its pending payment together.
    async fn create_pending_checkout(&self, checkout: NewCheckout) -> Result<CheckoutRecord>;

    async fn apply_payment_succeeded(
        &self,
        activation: PaymentActivation,
    ) -> Result<ActivationOutcome>;

    async fn settle_payment(&self, settlement: PaymentSettlement) -> Result<SettlementOutcome>;

    async fn apply_refund(
        &self,
        provider_payment_id: String,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome>;
}
