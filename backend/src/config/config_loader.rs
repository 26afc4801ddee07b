use std::{fmt::Display, str::FromStr};

use anyhow::{Context, Result, anyhow};
use jurist_core::{
    infra::telegram::bot_client::DEFAULT_TELEGRAM_API_BASE,
    llm::gigachat_client::{DEFAULT_GIGACHAT_API_BASE, DEFAULT_GIGACHAT_AUTH_URL},
    payments::yookassa_client::DEFAULT_YOOKASSA_API_BASE,
};

use super::{
    config_model::{BackendServer, BotApi, Database, DotEnvyConfig, GigaChat, Telegram, YooKassa},
    stage::Stage,
};

pub const DEFAULT_RETURN_URL: &str = "https://t.me/AIlawer_bot";

pub const DEFAULT_SYSTEM_PROMPT: &str = "Ты — профессиональный AI-юрист с глубокими знаниями \
российского законодательства. Отвечай структурированно, ссылайся на конкретные статьи законов РФ, \
давай практические рекомендации и указывай, когда нужна консультация практикующего юриста.";

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();
    load_from(|key| std::env::var(key).ok())
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or_default();
    Stage::try_from(&stage_str).unwrap_or_default()
}

/// Builds the configuration from an arbitrary variable source.
pub fn load_from<F>(lookup: F) -> Result<DotEnvyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let vars = Vars(lookup);

    let stage = match vars.get("STAGE") {
        Some(raw) => Stage::try_from(&raw).context("STAGE is invalid")?,
        None => Stage::default(),
    };

    let server = BackendServer {
        port: vars.parsed_or("SERVER_PORT_BACKEND", 8080)?,
        body_limit: vars.parsed_or("SERVER_BODY_LIMIT", 1)?,
        timeout: vars.parsed_or("SERVER_TIMEOUT", 30)?,
    };

    let database = Database {
        url: vars.required("DATABASE_URL")?,
        max_connections: vars.parsed_or("DATABASE_MAX_CONNECTIONS", 10)?,
        connect_timeout_secs: vars.parsed_or("DATABASE_CONNECT_TIMEOUT", 5)?,
    };

    let yookassa = YooKassa {
        shop_id: vars.required("YOOKASSA_SHOP_ID")?,
        secret_key: vars.required("YOOKASSA_SECRET_KEY")?,
        api_base: vars.or("YOOKASSA_API_BASE", DEFAULT_YOOKASSA_API_BASE),
        return_url: vars.or("YOOKASSA_RETURN_URL", DEFAULT_RETURN_URL),
        verify_webhooks: vars.parsed_or("YOOKASSA_VERIFY_WEBHOOKS", true)?,
        timeout_secs: vars.parsed_or("YOOKASSA_TIMEOUT", 10)?,
    };

    let gigachat = GigaChat {
        credentials: vars.required("GIGACHAT_CREDENTIALS")?,
        scope: vars.or("GIGACHAT_SCOPE", "GIGACHAT_API_PERS"),
        model: vars.or("GIGACHAT_MODEL", "GigaChat"),
        auth_url: vars.or("GIGACHAT_AUTH_URL", DEFAULT_GIGACHAT_AUTH_URL),
        api_base: vars.or("GIGACHAT_API_BASE", DEFAULT_GIGACHAT_API_BASE),
        verify_tls: vars.parsed_or("GIGACHAT_VERIFY_TLS", false)?,
        timeout_secs: vars.parsed_or("GIGACHAT_TIMEOUT", 60)?,
        system_prompt: vars.or("CONSULTATION_SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
    };

    let telegram = Telegram {
        bot_token: vars.required("TELEGRAM_BOT_TOKEN")?,
        api_base: vars.or("TELEGRAM_API_BASE", DEFAULT_TELEGRAM_API_BASE),
        timeout_secs: vars.parsed_or("TELEGRAM_TIMEOUT", 10)?,
    };

    let bot_api = BotApi {
        jwt_secret: vars.required("BOT_API_JWT_SECRET")?,
    };

    Ok(DotEnvyConfig {
        stage,
        server,
        database,
        yookassa,
        gigachat,
        telegram,
        bot_api,
    })
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.get(key).ok_or_else(|| anyhow!("{key} is missing"))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|error| anyhow!("{key} is invalid ({raw}): {error}")),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn required_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost:5432/jurist"),
            ("YOOKASSA_SHOP_ID", "123456"),
            ("YOOKASSA_SECRET_KEY", "test_secret"),
            ("GIGACHAT_CREDENTIALS", "Y2xpZW50OnNlY3JldA=="),
            ("TELEGRAM_BOT_TOKEN", "1:abc"),
            ("BOT_API_JWT_SECRET", "supersecretjwtsecretforunittesting123"),
        ])
    }

    fn load_with(vars: &HashMap<&'static str, &'static str>) -> Result<DotEnvyConfig> {
        load_from(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_fill_optional_values() {
        let config = load_with(&required_vars()).unwrap();

        assert_eq!(config.stage, Stage::Local);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.yookassa.return_url, DEFAULT_RETURN_URL);
        assert!(config.yookassa.verify_webhooks);
        assert!(!config.gigachat.verify_tls);
        assert_eq!(config.gigachat.scope, "GIGACHAT_API_PERS");
    }

    #[test]
    fn missing_required_variable_is_an_error() {
        let mut vars = required_vars();
        vars.remove("YOOKASSA_SECRET_KEY");

        let error = load_with(&vars).unwrap_err();
        assert!(error.to_string().contains("YOOKASSA_SECRET_KEY"));
    }

    #[test]
    fn malformed_number_is_an_error() {
        let mut vars = required_vars();
        vars.insert("SERVER_PORT_BACKEND", "eighty");

        let error = load_with(&vars).unwrap_err();
        assert!(error.to_string().contains("SERVER_PORT_BACKEND"));
    }

    #[test]
    fn stage_is_parsed() {
        let mut vars = required_vars();
        vars.insert("STAGE", "production");
        assert_eq!(load_with(&vars).unwrap().stage, Stage::Production);
    }
}
