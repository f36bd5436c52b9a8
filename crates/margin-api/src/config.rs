//! Server configuration.

use margin_core::defaults;
use margin_pipeline::PipelineConfig;

/// Settings for the HTTP server and the pipeline it drives.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub pipeline: PipelineConfig,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u64,
    pub rate_limit_period_secs: u64,
    /// Origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            pipeline: PipelineConfig::default(),
            rate_limit_enabled: true,
            rate_limit_requests: defaults::RATE_LIMIT_REQUESTS,
            rate_limit_period_secs: defaults::RATE_LIMIT_PERIOD_SECS,
            allowed_origins: Vec::new(),
            max_body_size: defaults::MAX_BODY_SIZE_BYTES,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `HOST` | `0.0.0.0` | Bind address |
    /// | `PORT` | `3000` | Bind port |
    /// | `RATE_LIMIT_ENABLED` | `true` | Inbound rate limiting |
    /// | `RATE_LIMIT_REQUESTS` | `100` | Requests per period |
    /// | `RATE_LIMIT_PERIOD_SECS` | `60` | Period length |
    /// | `CORS_ALLOWED_ORIGINS` | (any) | Comma-separated origin list |
    ///
    /// Pipeline settings come from [`PipelineConfig::from_env`].
    pub fn from_env() -> Self {
        let base = Self::default();

        let host = std::env::var("HOST").unwrap_or(base.host);
        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(base.port);

        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(base.rate_limit_enabled);
        let rate_limit_requests = std::env::var("RATE_LIMIT_REQUESTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(base.rate_limit_requests);
        let rate_limit_period_secs = std::env::var("RATE_LIMIT_PERIOD_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(base.rate_limit_period_secs);

        let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_default();

        Self {
            host,
            port,
            pipeline: PipelineConfig::from_env(),
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_period_secs,
            allowed_origins,
            max_body_size: base.max_body_size,
        }
    }
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
