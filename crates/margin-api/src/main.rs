//! margin-api: HTTP server for the margin highlight sync pipeline.

use std::net::SocketAddr;

use tracing::info;

use margin_api::services::kv_store_from_env;
use margin_api::telemetry::{self, LogSettings};
use margin_api::{router, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _log_guard = telemetry::init(&LogSettings::from_env());

    let config = ServerConfig::from_env();
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        rate_limit_enabled = config.rate_limit_enabled,
        rate_limit_requests = config.rate_limit_requests,
        rate_limit_period_secs = config.rate_limit_period_secs,
        batch_size = config.pipeline.batch_size,
        "Configuration loaded"
    );

    let kv = kv_store_from_env().await;
    let app = router(AppState::new(config, kv));

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
