use super::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub server: BackendServer,
    pub database: Database,
    pub yookassa: YooKassa,
    pub gigachat: GigaChat,
    pub telegram: Telegram,
    pub bot_api: BotApi,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    /// Megabytes.
    pub body_limit: u64,
    /// Seconds.
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct YooKassa {
    pub shop_id: String,
    pub secret_key: String,
    pub api_base: String,
    pub return_url: String,
    /// Re-fetch the payment from the provider before applying a notification.
    pub verify_webhooks: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct GigaChat {
    pub credentials: String,
    pub scope: String,
    pub model: String,
    pub auth_url: String,
    pub api_base: String,
    pub verify_tls: bool,
    pub timeout_secs: u64,
    pub system_prompt: String,
}

#[derive(Debug, Clone)]
pub struct Telegram {
    pub bot_token: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct BotApi {
    pub jwt_secret: String,
}
