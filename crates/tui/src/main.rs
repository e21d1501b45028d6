mod app;

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    path::Path,
};

use tarkov_list_core::{
    app::ListController,
    config::{self, AppConfig},
};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    config::ensure_default_config()?;
    let config = AppConfig::load()?;
    init_logging(&config.log_dir())?;
    tracing::info!(api = %config.api_url, ttl_minutes = config.cache_ttl_minutes, "starting");

    let controller = ListController::from_config(&config)?;
    let mut app = app::TarkovListApp::new(controller);
    app.run().await
}

// Logs go to a file only; stdout belongs to the alternate screen.
fn init_logging(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join("tarkov-list.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(std::sync::Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
