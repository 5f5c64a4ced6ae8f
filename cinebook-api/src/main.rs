use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cinebook_api::app;
use cinebook_api::metrics::Metrics;
use cinebook_api::wiring::{assemble, Backends};
use cinebook_api::worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinebook_api=debug,cinebook_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cinebook_store::app_config::Config::load().context("Failed to load config")?;
    tracing::info!("Starting CineBook API on port {}", config.server.port);

    let backends = Backends::from_config(&config).await?;
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    let services = assemble(&config, backends, metrics)?;

    tokio::spawn(worker::run_expiry_sweep(
        services.reaper.clone(),
        config.booking_rules.sweep_interval(),
    ));
    tokio::spawn(worker::run_reminder_scan(services.reminders.clone()));

    if let Some(kafka) = config.kafka.clone() {
        let direct = services.direct.clone();
        tokio::spawn(async move {
            if let Err(e) =
                worker::start_notification_worker(kafka.brokers, kafka.group_id, kafka.notifications_topic, direct).await
            {
                tracing::error!("Notification worker stopped: {}", e);
            }
        });
    }

    let app = app(services.state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
