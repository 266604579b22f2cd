mod bootstrap;
mod health;
mod jobs;

use std::time::Duration;

use anyhow::Result;
use questpal_core::config::{AppConfig, LoadOptions};
use tracing::{info, warn};

fn init_logging(config: &AppConfig) {
    use questpal_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        health::HealthState::new(app.db_pool.clone(), app.catalog.clone()),
    )
    .await?;

    let mut background = vec![jobs::spawn_midnight_clear(app.catalog.clone())];
    match app.config.catalog.feed_path.clone() {
        Some(path) => background.push(jobs::spawn_feed_refresh(
            app.catalog.clone(),
            path,
            Duration::from_secs(app.config.catalog.refresh_interval_secs),
        )),
        None => warn!(
            event_name = "system.server.no_quest_feed",
            correlation_id = "bootstrap",
            "catalog.feed_path is not set; the quest catalog stays empty"
        ),
    }

    info!(event_name = "system.server.started", correlation_id = "bootstrap", "questpal-server started");

    let outcome = tokio::select! {
        polled = app.runner.start() => polled,
        signal = tokio::signal::ctrl_c() => signal.map_err(anyhow::Error::from),
    };

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        active_chats = app.dispatcher.active_chats(),
        "questpal-server stopping"
    );
    for job in background {
        job.abort();
    }

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "database pool did not close within the grace period"
        );
    }

    outcome
}
