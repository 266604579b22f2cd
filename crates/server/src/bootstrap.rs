use std::sync::Arc;

use questpal_core::catalog::InMemoryQuestCatalog;
use questpal_core::config::{AppConfig, ConfigError, LoadOptions};
use questpal_db::{connect_with_settings, migrations, DbPool, SqlProfileRepository};
use questpal_engine::{
    EngineServices, HuntEngine, HuntRouter, HuntSettings, NominatimGeocoder, SystemClock,
};
use questpal_telegram::{
    BotApiClient, ChatDispatcher, Messenger, PollingRunner, ReconnectPolicy, SlotManager,
    ThrottledMessenger,
};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub catalog: Arc<InMemoryQuestCatalog>,
    pub dispatcher: Arc<ChatDispatcher>,
    pub runner: PollingRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let client = Arc::new(BotApiClient::new(&config.telegram));
    let messenger: Arc<dyn Messenger> = if config.dispatch.enabled {
        Arc::new(ThrottledMessenger::new(client.clone(), &config.dispatch))
    } else {
        client.clone()
    };
    info!(
        event_name = "system.bootstrap.dispatch_configured",
        correlation_id = "bootstrap",
        limiter_enabled = config.dispatch.enabled,
        "outbound dispatch configured"
    );

    let catalog = Arc::new(InMemoryQuestCatalog::new());
    let services = EngineServices {
        profiles: Arc::new(SqlProfileRepository::new(db_pool.clone())),
        catalog: catalog.clone(),
        slots: Arc::new(SlotManager::new(messenger)),
        geocoder: Arc::new(NominatimGeocoder::new(&config.hunt)),
        clock: Arc::new(SystemClock),
    };
    let engine = Arc::new(HuntEngine::new(services, HuntSettings::from_config(&config.hunt)));
    let dispatcher = Arc::new(ChatDispatcher::new(Arc::new(HuntRouter::new(engine))));
    let runner = PollingRunner::new(
        client,
        dispatcher.clone(),
        ReconnectPolicy::default(),
        config.telegram.poll_timeout_secs,
    );

    Ok(Application { config, db_pool, catalog, dispatcher, runner })
}
