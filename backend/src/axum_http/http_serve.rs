use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    Extension, Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
};
use jurist_core::{
    infra::{db::postgres::postgres_connection::PgPoolSquad, telegram::notice_queue::NoticeQueue},
    llm::gigachat_client::GigaChatClient,
    payments::yookassa_client::YooKassaClient,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::{
    auth::BotApiKey,
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
    usecases::health::{DatabaseCheck, HealthCheck, HealthUseCase, LlmCheck, PaymentGatewayCheck},
};

pub const SERVICE_NAME: &str = "jurist-billing";

/// Outbound clients shared by every router.
pub struct ExternalServices {
    pub yookassa: Arc<YooKassaClient>,
    pub gigachat: Arc<GigaChatClient>,
    pub notices: Arc<NoticeQueue>,
}

pub fn app(config: &DotEnvyConfig, db_pool: Arc<PgPoolSquad>, services: ExternalServices) -> Result<Router> {
    let checks: Vec<Arc<dyn HealthCheck>> = vec![
        Arc::new(DatabaseCheck::new(Arc::clone(&db_pool))),
        Arc::new(PaymentGatewayCheck::new(Arc::clone(&services.yookassa))),
        Arc::new(LlmCheck::new(Arc::clone(&services.gigachat))),
    ];
    let health_usecase = HealthUseCase::new(
        checks,
        SERVICE_NAME.to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );

    let bot_api_key = BotApiKey::new(&config.bot_api.jwt_secret);

    let bot_api = Router::new()
        .nest(
            "/subscriptions",
            routers::subscriptions::routes(
                Arc::clone(&db_pool),
                Arc::clone(&services.yookassa),
                Arc::clone(&services.notices),
                config.yookassa.verify_webhooks,
            ),
        )
        .nest("/usage", routers::usage::routes(Arc::clone(&db_pool)))
        .nest(
            "/consultations",
            routers::consultations::routes(
                Arc::clone(&db_pool),
                Arc::clone(&services.gigachat),
                config.gigachat.system_prompt.clone(),
            ),
        )
        .layer(Extension(bot_api_key));

    let app = Router::new()
        .fallback(default_routers::not_found)
        .nest(
            "/webhook",
            routers::payment_webhook::routes(
                Arc::clone(&db_pool),
                Arc::clone(&services.yookassa),
                Arc::clone(&services.notices),
                config.yookassa.verify_webhooks,
            ),
        )
        .nest("/api/v1", bot_api)
        .merge(routers::health::routes(Arc::new(health_usecase)))
        .layer(TimeoutLayer::new(Duration::from_secs(config.server.timeout)))
        .layer(RequestBodyLimitLayer::new(
            (config.server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

pub async fn start(
    config: Arc<DotEnvyConfig>,
    db_pool: Arc<PgPoolSquad>,
    services: ExternalServices,
) -> Result<()> {
    let app = app(&config, db_pool, services)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr).await?;

    info!(stage = %config.stage, "Server is running on port {}", config.server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
