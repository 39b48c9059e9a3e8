use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use hyperspace::store::SqliteStore;
use hyperspace::{app, seed, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();

    let log_level: tracing::Level = config.log_level.parse().unwrap_or(tracing::Level::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(env_filter);
    tracing_subscriber::registry().with(fmt_layer).init();

    let store = match &config.database {
        Some(path) => SqliteStore::open(path)
            .with_context(|| format!("opening database {}", path.display()))?,
        None => {
            tracing::warn!("no --database given, using an in-memory database");
            SqliteStore::open_memory().context("opening in-memory database")?
        }
    };
    let store = Arc::new(store);

    if let Some(path) = &config.dev_seed {
        let records = seed::read_seed_file(path)?;
        let inserted = seed::seed_identities(store.as_ref(), records).await?;
        tracing::info!(inserted, path = %path.display(), "loaded dev seed");
    }

    let listen = config.listen;
    let state = AppState::new(store, config);
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    tracing::info!(%listen, "hyperspace relay listening");

    app::serve(listener, app::router(state), async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
    })
    .await?;

    tracing::info!("hyperspace relay stopped");
    Ok(())
}
