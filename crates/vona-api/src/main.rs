//! Vona API Server
//!
//! REST API server for the Vona shopping assistant.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use vona_api::{create_router, AppState, Services};
use vona_core::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config);

    let services = Services::from_config(&config).await?;
    match services.bootstrap().await? {
        Some(indexed) => tracing::info!(indexed, "Semantic index built"),
        None => tracing::info!(
            documents = services.chat.index().len().await?,
            "Semantic index restored"
        ),
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::from_services(config, &services));
    state.set_ready(true);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Vona API Server starting on http://{}", addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// `VONA_CONFIG` names a TOML file; the environment wins over it
fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("VONA_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("vona_api=debug,tower_http=debug,{}", config.logging.level).into()
    });

    if config.logging.json_format {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    tracing::info!("Shutdown signal received");
}
