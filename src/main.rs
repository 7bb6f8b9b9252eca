//! InsightGUIDE API server.

use anyhow::Context;
use insight_guide::config::{Config, LogLevel};
use insight_guide::pipeline::InsightPipeline;
use insight_guide::server::{router, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Tracing first, so warnings raised while loading the config are seen.
    let level = LogLevel::from_lookup(|key| std::env::var(key).ok());
    insight_guide::init_tracing(&level.directives());

    let config = Config::from_env().context("Configuration validation failed")?;
    info!(
        "Starting InsightGUIDE API (model: {}, prompt: '{}' from {:?})",
        config.model, config.system_prompt_key, config.system_prompt_file
    );

    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let pipeline = InsightPipeline::from_config(&config, client)
        .with_context(|| format!("Failed to create output directory {:?}", config.output_dir))?;

    let addr = config.bind_addr();
    let app = router(AppState::new(config, pipeline))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down InsightGUIDE API");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
