use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use evalseal::core::SystemClock;
use evalseal::store::SqliteStore;
use evalseal::Engine;
use evalseal_server::{router, spawn_purge, Settings};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let settings = Settings::parse();

    let registry = settings
        .registry()
        .context("invalid signing key configuration")?;
    tracing::info!(
        keys = registry.len(),
        active_key = %registry.active_id(),
        "key registry loaded"
    );

    let store = SqliteStore::open(&settings.db)
        .with_context(|| format!("failed to open store at {}", settings.db.display()))?;

    let config = settings
        .engine_config()
        .context("invalid replay configuration")?;
    tracing::info!(?config, db = %settings.db.display(), "engine configured");

    let engine = Arc::new(Engine::new(
        Arc::new(registry),
        Arc::new(store),
        Arc::new(SystemClock),
        config,
    ));

    if let Some(every) = settings.purge_interval() {
        spawn_purge(engine.clone(), every);
    }

    let listener = TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down gracefully");
}
