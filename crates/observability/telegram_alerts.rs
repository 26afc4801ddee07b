use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::SecondsFormat;

use super::{
    config::TelegramAlertConfig,
    notifier::{AlertEvent, AlertSink},
};
use crate::infra::{
    http::retry::RetryPolicy,
    telegram::bot_client::{ChatMessenger, TelegramBotClient},
};

const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

pub(crate) struct TelegramAlertSink {
    messenger: Arc<dyn ChatMessenger>,
    chat_id: i64,
}

impl TelegramAlertSink {
    pub(crate) fn from_config(config: &TelegramAlertConfig) -> Result<Self> {
        // One attempt only: retries would log warnings that could be alerted on again.
        let client = TelegramBotClient::new(
            config.bot_token.clone(),
            &config.api_base,
            Duration::from_secs(3),
            RetryPolicy::immediate(1),
        )?;

        Ok(Self {
            messenger: Arc::new(client),
            chat_id: config.chat_id,
        })
    }
}

#[async_trait]
impl AlertSink for TelegramAlertSink {
    async fn deliver(&self, event: &AlertEvent) -> Result<()> {
        self.messenger
            .send_text(self.chat_id, format_alert(event))
            .await
    }

    fn sink_name(&self) -> &'static str {
        "telegram"
    }
}

pub(crate) fn format_alert(event: &AlertEvent) -> String {
    let mut text = format!(
        "[{}] {} / {} / {}\n{} {}",
        event.level,
        event.service_name,
        event.environment,
        event.component,
        event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        event.target,
    );
    if let Some(location) = &event.location {
        text.push_str(&format!(" ({location})"));
    }

    if let Some(message) = event.message.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        text.push_str(&format!("\n\n{message}"));
    }

    for (key, value) in &event.fields {
        text.push_str(&format!("\n{key} = {value}"));
    }

    for span in &event.spans {
        text.push_str(&format!("\nin {}", span.name));
        for (key, value) in &span.fields {
            text.push_str(&format!(" {key}={value}"));
        }
    }

    truncate_chars(text, TELEGRAM_MESSAGE_LIMIT)
}

fn truncate_chars(text: String, limit: usize) -> String {
    const SUFFIX: &str = "\n…";

    if text.chars().count() <= limit {
        return text;
    }

    let keep = limit.saturating_sub(SUFFIX.chars().count());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(SUFFIX);
    truncated
}
