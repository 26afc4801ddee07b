use std::env;

use tracing::Level;

#[derive(Clone, Debug)]
pub(crate) struct ServiceContext {
    pub(crate) service_name: String,
    pub(crate) environment: String,
    pub(crate) component: String,
}

#[derive(Clone)]
pub(crate) struct TelegramAlertConfig {
    pub(crate) bot_token: String,
    pub(crate) api_base: String,
    pub(crate) chat_id: i64,
    pub(crate) min_level: Level,
}

#[derive(Clone)]
pub(crate) struct ObservabilityConfig {
    pub(crate) service_context: ServiceContext,
    pub(crate) alerts: Option<TelegramAlertConfig>,
    /// Collected while parsing; logged once the subscriber exists.
    pub(crate) warnings: Vec<String>,
}

impl ObservabilityConfig {
    pub(crate) fn from_env(component: &str) -> Self {
        Self::from_lookup(component, |key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(component: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let component = component.trim().to_string();

        let service_context = ServiceContext {
            service_name: non_empty("SERVICE_NAME").unwrap_or_else(|| component.clone()),
            environment: non_empty("STAGE").unwrap_or_else(|| "unknown".to_string()),
            component,
        };

        let mut warnings = Vec::new();
        let alerts = alerts_from(&non_empty, &mut warnings);

        Self {
            service_context,
            alerts,
            warnings,
        }
    }
}

fn alerts_from<F>(non_empty: &F, warnings: &mut Vec<String>) -> Option<TelegramAlertConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let enabled = non_empty("ALERT_NOTIFY_ENABLED")
        .and_then(|raw| parse_bool(&raw))
        .unwrap_or(true);
    if !enabled {
        return None;
    }

    let raw_chat_id = non_empty("ALERT_TELEGRAM_CHAT_ID")?;
    let chat_id = match raw_chat_id.parse::<i64>() {
        Ok(chat_id) => chat_id,
        Err(_) => {
            warnings.push(format!(
                "ALERT_TELEGRAM_CHAT_ID is not an integer (value: {raw_chat_id}); admin alerts disabled"
            ));
            return None;
        }
    };

    let Some(bot_token) = non_empty("TELEGRAM_BOT_TOKEN") else {
        warnings.push("ALERT_TELEGRAM_CHAT_ID is set but TELEGRAM_BOT_TOKEN is missing; admin alerts disabled".to_string());
        return None;
    };

    let min_level = match non_empty("ALERT_NOTIFY_LEVEL") {
        None => Level::ERROR,
        Some(raw) => parse_level(&raw).unwrap_or_else(|| {
            warnings.push(format!("ALERT_NOTIFY_LEVEL is invalid (value: {raw}); using ERROR"));
            Level::ERROR
        }),
    };

    Some(TelegramAlertConfig {
        bot_token,
        api_base: non_empty("TELEGRAM_API_BASE")
            .unwrap_or_else(|| crate::infra::telegram::bot_client::DEFAULT_TELEGRAM_API_BASE.to_string()),
        chat_id,
        min_level,
    })
}

pub(crate) fn parse_level(input: &str) -> Option<Level> {
    match input.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ObservabilityConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ObservabilityConfig::from_lookup("backend", |key| vars.get(key).cloned())
    }

    #[test]
    fn alerts_need_chat_id_and_token() {
        assert!(config(&[]).alerts.is_none());
        assert!(config(&[("ALERT_TELEGRAM_CHAT_ID", "-100123")]).alerts.is_none());

        let enabled = config(&[
            ("ALERT_TELEGRAM_CHAT_ID", "-100123"),
            ("TELEGRAM_BOT_TOKEN", "1:abc"),
        ]);
        let alerts = enabled.alerts.unwrap();
        assert_eq!(alerts.chat_id, -100123);
        assert_eq!(alerts.min_level, Level::ERROR);
    }

    #[test]
    fn invalid_level_falls_back_with_warning() {
        let config = config(&[
            ("ALERT_TELEGRAM_CHAT_ID", "7"),
            ("TELEGRAM_BOT_TOKEN", "1:abc"),
            ("ALERT_NOTIFY_LEVEL", "loud"),
        ]);
        assert_eq!(config.alerts.unwrap().min_level, Level::ERROR);
        assert_eq!(config.warnings.len(), 1);
    }

    #[test]
    fn alerts_can_be_switched_off() {
        let config = config(&[
            ("ALERT_TELEGRAM_CHAT_ID", "7"),
            ("TELEGRAM_BOT_TOKEN", "1:abc"),
            ("ALERT_NOTIFY_ENABLED", "false"),
        ]);
        assert!(config.alerts.is_none());
    }

    #[test]
    fn service_name_defaults_to_component() {
        let config = config(&[("STAGE", "production")]);
        assert_eq!(config.service_context.service_name, "backend");
        assert_eq!(config.service_context.environment, "production");
    }
}
