mod config;
mod layer;
mod notifier;
mod telegram_alerts;

use std::sync::Arc;

use anyhow::Result;
use config::ObservabilityConfig;
use layer::ErrorAlertLayer;
use notifier::AlertQueue;
use telegram_alerts::TelegramAlertSink;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Installs the global subscriber: `RUST_LOG` filter (default `info`), local
/// RFC3339 timestamps, and the optional Telegram admin alert layer.
/// Must be called from within a Tokio runtime when alerts are configured.
pub fn init_observability(component: &str) -> Result<()> {
    let mut config = ObservabilityConfig::from_env(component);

    let alert_layer = match config.alerts.as_ref() {
        Some(alerts) => match TelegramAlertSink::from_config(alerts) {
            Ok(sink) => {
                let queue = AlertQueue::start(vec![Arc::new(sink)]);
                Some(
                    ErrorAlertLayer::new(queue, config.service_context.clone())
                        .with_filter(LevelFilter::from_level(alerts.min_level)),
                )
            }
            Err(error) => {
                config
                    .warnings
                    .push(format!("admin alert sink could not be built: {error}"));
                None
            }
        },
        None => None,
    };
    let alerts_enabled = alert_layer.is_some();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(alert_layer)
        .with(env_filter)
        .try_init()?;

    let context = &config.service_context;
    for warning in &config.warnings {
        warn!(
            service = %context.service_name,
            environment = %context.environment,
            warning = %warning,
            "observability: config warning"
        );
    }

    info!(
        service = %context.service_name,
        environment = %context.environment,
        component = %context.component,
        alerts_enabled,
        "observability: initialized"
    );

    Ok(())
}
