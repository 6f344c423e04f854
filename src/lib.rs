pub mod api;
pub mod authorization;
pub mod config;
pub mod core_state;
pub mod crypto;
pub mod db;
pub mod documents;
pub mod mailer;
pub mod mental_health;
pub mod models;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Core(#[from] core_state::CoreError),
    #[error(transparent)]
    Server(#[from] api::server::ServerError),
    #[error("Cannot listen for shutdown signal: {0}")]
    Signal(std::io::Error),
}

/// Start the clinic API and serve until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::from_env()?;
    let bind_addr = config.bind_addr;
    tracing::info!(db = %config.db_path.display(), "Opening database");
    let core = Arc::new(core_state::CoreState::open(config)?);

    let server = api::start_api_server_on(core, bind_addr).await?;
    tracing::info!(addr = %server.session.server_addr, "Listening");

    tokio::signal::ctrl_c().await.map_err(StartupError::Signal)?;
    server.stop().await;
    Ok(())
}
