use anyhow::{Result, Context};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

mod api;
mod atlas;
mod config;
mod engine;
mod errors;
mod fallback;
mod metrics;
mod models;
mod providers;
mod regions;

use crate::config::AppConfig;
use crate::engine::Engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let config_path = "config.json";
    let config_content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path))?;
    let config: AppConfig = serde_json::from_str(&config_content)
        .with_context(|| "Failed to parse config")?;

    let engine = Arc::new(Engine::new(config.clone())?);
    let state_for_api = engine.state.clone();
    let api_port = config.api_port;

    tokio::spawn(async move {
        api::start_server(api_port, state_for_api).await;
    });

    let engine_clone = Arc::clone(&engine);
    tokio::spawn(async move {
        if let Err(e) = engine_clone.run().await {
            tracing::error!("Telemetry engine failed: {}", e);
        }
    });

    signal::ctrl_c().await?;
    info!("Shutdown signal received. Closing censorship telemetry engine...");

    Ok(())
}
