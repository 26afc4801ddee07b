use anyhow::Result as AnyResult;
use async_trait::async_trait;
use jurist_core::{
    llm::gigachat_client::{ChatMessage, GigaChatClient},
    payments::yookassa_client::{CreatePaymentRequest, ProviderPayment, YooKassaClient},
};

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(&self, request: CreatePaymentRequest) -> AnyResult<ProviderPayment>;

    async fn get_payment(&self, provider_payment_id: String) -> AnyResult<ProviderPayment>;
}

#[async_trait]
impl PaymentGateway for YooKassaClient {
    async fn create_payment(&self, request: CreatePaymentRequest) -> AnyResult<ProviderPayment> {
        YooKassaClient::create_payment(self, &request).await
    }

    async fn get_payment(&self, provider_payment_id: String) -> AnyResult<ProviderPayment> {
        YooKassaClient::get_payment(self, &provider_payment_id).await
    }
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, system_prompt: String, question: String) -> AnyResult<String>;
}

#[async_trait]
impl ChatCompletion for GigaChatClient {
    async fn complete(&self, system_prompt: String, question: String) -> AnyResult<String> {
        let messages = [ChatMessage::system(system_prompt), ChatMessage::user(question)];
        GigaChatClient::complete(self, &messages).await
    }
}
