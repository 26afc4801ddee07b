use std::{sync::Arc, time::Duration};

use anyhow::Result;
use backend::{
    axum_http::http_serve::{self, ExternalServices},
    config::config_loader,
};
use jurist_core::{
    infra::{
        db::postgres::postgres_connection::{self, PoolSettings},
        http::retry::RetryPolicy,
        telegram::{
            bot_client::TelegramBotClient,
            notice_queue::{DEFAULT_NOTICE_QUEUE_CAPACITY, NoticeQueue},
        },
    },
    llm::gigachat_client::{GigaChatClient, GigaChatSettings},
    payments::yookassa_client::YooKassaClient,
};
use tracing::{error, info};

const CONSULTATION_TEMPERATURE: f32 = 0.7;
const CONSULTATION_MAX_TOKENS: u32 = 2000;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Backend exited with error: {}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    jurist_core::observability::init_observability("backend")?;

    let dotenvy_env = config_loader::load()?;
    info!(stage = %dotenvy_env.stage, "ENV has been loaded");

    let postgres_pool = postgres_connection::establish_connection(
        &dotenvy_env.database.url,
        &PoolSettings {
            max_size: dotenvy_env.database.max_connections,
            connection_timeout: Duration::from_secs(dotenvy_env.database.connect_timeout_secs),
        },
    )?;
    info!("Postgres connection has been established");

    let yookassa = YooKassaClient::new(
        dotenvy_env.yookassa.shop_id.clone(),
        dotenvy_env.yookassa.secret_key.clone(),
        &dotenvy_env.yookassa.api_base,
        dotenvy_env.yookassa.return_url.clone(),
        Duration::from_secs(dotenvy_env.yookassa.timeout_secs),
        RetryPolicy::default(),
    )?;

    let gigachat = GigaChatClient::new(
        GigaChatSettings {
            credentials: dotenvy_env.gigachat.credentials.clone(),
            scope: dotenvy_env.gigachat.scope.clone(),
            model: dotenvy_env.gigachat.model.clone(),
            auth_url: dotenvy_env.gigachat.auth_url.clone(),
            api_base: dotenvy_env.gigachat.api_base.clone(),
            verify_tls: dotenvy_env.gigachat.verify_tls,
            timeout: Duration::from_secs(dotenvy_env.gigachat.timeout_secs),
            temperature: CONSULTATION_TEMPERATURE,
            max_tokens: CONSULTATION_MAX_TOKENS,
        },
        RetryPolicy::default(),
    )?;

    let telegram = TelegramBotClient::new(
        dotenvy_env.telegram.bot_token.clone(),
        &dotenvy_env.telegram.api_base,
        Duration::from_secs(dotenvy_env.telegram.timeout_secs),
        RetryPolicy::default(),
    )?;
    let notices = NoticeQueue::start(Arc::new(telegram), DEFAULT_NOTICE_QUEUE_CAPACITY);
    info!("External clients have been configured");

    http_serve::start(
        Arc::new(dotenvy_env),
        Arc::new(postgres_pool),
        ExternalServices {
            yookassa: Arc::new(yookassa),
            gigachat: Arc::new(gigachat),
            notices: Arc::new(notices),
        },
    )
    .await?;

    Ok(())
}
