use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use mockall::automock;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::infra::http::retry::{RetryPolicy, is_transient, retry_with_backoff};

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Plain-text delivery to a Telegram chat.
#[async_trait]
#[automock]
pub trait ChatMessenger: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: String) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct BotApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Clone)]
pub struct TelegramBotClient {
    client: Client,
    api_base: String,
    bot_token: String,
    retry: RetryPolicy,
}

impl TelegramBotClient {
    pub fn new(
        bot_token: String,
        api_base: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build telegram http client")?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            retry,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn call<T>(&self, method: &str, payload: serde_json::Value) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = self.method_url(method);
        let (client, url, payload) = (&self.client, &url, &payload);

        let response = retry_with_backoff(&self.retry, is_transient, move || async move {
            client.post(url).json(payload).send().await?.error_for_status()
        })
        .await
        // The request URL embeds the bot token.
        .map_err(|error| anyhow!("telegram {method} failed: {}", error.without_url()))?;

        let body: BotApiResponse<T> = response
            .json()
            .await
            .map_err(|error| anyhow!("telegram {method} returned an unreadable body: {}", error.without_url()))?;

        if !body.ok {
            return Err(anyhow!(
                "telegram {method} rejected: {}",
                body.description.unwrap_or_else(|| "no description".to_string())
            ));
        }

        body.result
            .ok_or_else(|| anyhow!("telegram {method} returned ok without a result"))
    }
}

#[async_trait]
impl ChatMessenger for TelegramBotClient {
    async fn send_text(&self, chat_id: i64, text: String) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": text,
                    "disable_web_page_preview": true,
                }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_joins_base_token_and_method() {
        let client = TelegramBotClient::new(
            "123:abc".to_string(),
            "https://api.telegram.org/",
            Duration::from_secs(1),
            RetryPolicy::default(),
        )
        .unwrap();

        assert_eq!(
            client.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn error_envelope_is_decoded() {
        let body: BotApiResponse<serde_json::Value> = serde_json::from_str(
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
        )
        .unwrap();

        assert!(!body.ok);
        assert!(body.result.is_none());
        assert_eq!(
            body.description.as_deref(),
            Some("Forbidden: bot was blocked by the user")
        );
    }
}
