use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::infra::http::retry::{RetryPolicy, is_transient, retry_with_backoff};

pub const DEFAULT_GIGACHAT_AUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";
pub const DEFAULT_GIGACHAT_API_BASE: &str = "https://gigachat.devices.sberbank.ru/api/v1";

/// Tokens are refreshed this long before the provider says they expire.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct GigaChatSettings {
    /// Base64 authorization key issued in the developer console.
    pub credentials: String,
    pub scope: String,
    pub model: String,
    pub auth_url: String,
    pub api_base: String,
    pub verify_tls: bool,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Unix time in milliseconds.
    expires_at: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

/// Chat-completion client with a cached OAuth access token.
pub struct GigaChatClient {
    http: Client,
    settings: GigaChatSettings,
    retry: RetryPolicy,
    token: Mutex<Option<AccessToken>>,
}

impl GigaChatClient {
    pub fn new(settings: GigaChatSettings, retry: RetryPolicy) -> Result<Self> {
        // The provider's certificates are issued by a national CA that is
        // absent from the default root store.
        let http = Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(!settings.verify_tls)
            .build()
            .context("failed to build gigachat http client")?;

        Ok(Self {
            http,
            settings,
            retry,
            token: Mutex::new(None),
        })
    }

    async fn fetch_token(&self) -> Result<AccessToken> {
        let settings = &self.settings;
        let http = &self.http;

        let response = retry_with_backoff(&self.retry, is_transient, move || async move {
            http.post(&settings.auth_url)
                .header("Authorization", format!("Basic {}", settings.credentials))
                .header("RqUID", Uuid::new_v4().to_string())
                .header("Accept", "application/json")
                .form(&[("scope", settings.scope.as_str())])
                .send()
                .await?
                .error_for_status()
        })
        .await
        .map_err(|error| anyhow!("gigachat token request failed: {error}"))?;

        let token: TokenResponse = response
            .json()
            .await
            .context("gigachat token response is unreadable")?;

        let expires_at = Utc
            .timestamp_millis_opt(token.expires_at)
            .single()
            .ok_or_else(|| anyhow!("gigachat token has an invalid expiry: {}", token.expires_at))?;

        debug!(%expires_at, "gigachat: access token refreshed");

        Ok(AccessToken {
            value: token.access_token,
            expires_at,
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.settings.api_base.trim_end_matches('/'));
        let body = CompletionRequest {
            model: &self.settings.model,
            messages,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        // One extra round when the cached token was revoked early.
        for attempt in 0..2 {
            let token = self.access_token().await?;
            let (http, url, body) = (&self.http, &url, &body);

            let response = retry_with_backoff(&self.retry, is_transient, move || {
                let token = token.clone();
                async move {
                    let response = http.post(url).bearer_auth(token).json(body).send().await?;
                    if response.status().is_server_error()
                        || response.status() == StatusCode::TOO_MANY_REQUESTS
                    {
                        return response.error_for_status();
                    }
                    Ok(response)
                }
            })
            .await
            .map_err(|error| anyhow!("gigachat completion request failed: {error}"))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && attempt == 0 {
                self.invalidate_token().await;
                continue;
            }
            if !status.is_success() {
                error!(status = %status, "gigachat: completion rejected");
                return Err(anyhow!("gigachat completion failed with status {status}"));
            }

            let completion: CompletionResponse = response
                .json()
                .await
                .context("gigachat completion response is unreadable")?;

            return completion
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .filter(|content| !content.trim().is_empty())
                .ok_or_else(|| anyhow!("gigachat returned an empty completion"));
        }

        Err(anyhow!("gigachat rejected a freshly issued access token"))
    }

    /// Health check: forces a token round-trip to the auth endpoint.
    pub async fn ping(&self) -> Result<()> {
        let token = self.fetch_token().await?;
        *self.token.lock().await = Some(token);
        Ok(())
    }
}
