use anyhow::Context;
use formhook::http_server::{self, ServerState};
use formhook::{Config, Dispatcher, JsonFileStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("formhook v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("failed to load config")?;

    let store = Arc::new(
        JsonFileStore::open(config.data_dir.clone())
            .await
            .with_context(|| format!("failed to open store at {}", config.data_dir.display()))?,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        config.dispatcher.clone(),
        store.clone(),
        store.clone(),
    )?);

    http_server::start(&config.bind_addr, ServerState { store, dispatcher })
        .await
        .context("failed to start HTTP server")?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
