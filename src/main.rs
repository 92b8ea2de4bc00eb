//! NIDE server binary
//!
//! Loads the model artifacts, spawns the batching scheduler and serves the
//! prediction API.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nide::{build_router, AppState, Config, ForestModel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let model = Arc::new(
        ForestModel::load(&config.artifacts_path)
            .with_context(|| format!("loading model artifacts from {}", config.artifacts_path))?,
    );
    tracing::info!(
        model = model.name(),
        classes = model.classes().len(),
        "model loaded"
    );

    let state = Arc::new(AppState::new(model, config.scheduler.clone()));
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!("intrusion detection API listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain in-flight batches before the process exits.
    state.scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}
