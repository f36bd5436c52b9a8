//! Pipeline configuration.

use std::time::Duration;

use margin_core::defaults;

/// Endpoints, batching and stage budgets for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Readwise API base URL.
    pub readwise_base_url: String,
    /// Mem note creation endpoint.
    pub mem_base_url: String,
    /// Notes delivered concurrently per batch.
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_delay: Duration,
    /// Wall-clock budget of a fetch stage.
    pub fetch_budget: Duration,
    /// Wall-clock budget of a delivery stage.
    pub deliver_budget: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            readwise_base_url: defaults::READWISE_BASE_URL.to_string(),
            mem_base_url: defaults::MEM_BASE_URL.to_string(),
            batch_size: defaults::BATCH_SIZE,
            batch_delay: Duration::from_millis(defaults::BATCH_DELAY_MS),
            fetch_budget: Duration::from_secs(defaults::FETCH_BUDGET_SECS),
            deliver_budget: Duration::from_secs(defaults::DELIVER_BUDGET_SECS),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `READWISE_BASE_URL` | `https://readwise.io/api/v2` | Source API |
    /// | `MEM_BASE_URL` | `https://api.mem.ai/v2/mem-it` | Sink endpoint |
    /// | `SYNC_BATCH_SIZE` | `10` | Notes per batch |
    /// | `SYNC_BATCH_DELAY_MS` | `500` | Pause between batches |
    /// | `FETCH_BUDGET_SECS` | `60` | Fetch stage budget |
    /// | `DELIVER_BUDGET_SECS` | `300` | Delivery stage budget |
    pub fn from_env() -> Self {
        let base = Self::default();

        let readwise_base_url =
            std::env::var("READWISE_BASE_URL").unwrap_or(base.readwise_base_url);
        let mem_base_url = std::env::var("MEM_BASE_URL").unwrap_or(base.mem_base_url);

        let batch_size = std::env::var("SYNC_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(base.batch_size)
            .max(1);

        let batch_delay = std::env::var("SYNC_BATCH_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(base.batch_delay);

        let fetch_budget = std::env::var("FETCH_BUDGET_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(base.fetch_budget);

        let deliver_budget = std::env::var("DELIVER_BUDGET_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(base.deliver_budget);

        Self {
            readwise_base_url,
            mem_base_url,
            batch_size,
            batch_delay,
            fetch_budget,
            deliver_budget,
        }
    }

    pub fn with_readwise_base_url(mut self, url: impl Into<String>) -> Self {
        self.readwise_base_url = url.into();
        self
    }

    pub fn with_mem_base_url(mut self, url: impl Into<String>) -> Self {
        self.mem_base_url = url.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn with_fetch_budget(mut self, budget: Duration) -> Self {
        self.fetch_budget = budget;
        self
    }

    pub fn with_deliver_budget(mut self, budget: Duration) -> Self {
        self.deliver_budget = budget;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.batch_delay, Duration::from_millis(500));
        assert_eq!(config.fetch_budget, Duration::from_secs(60));
        assert_eq!(config.deliver_budget, Duration::from_secs(300));
    }

    #[test]
    fn test_builder_clamps_batch_size() {
        let config = PipelineConfig::default().with_batch_size(0);
        assert_eq!(config.batch_size, 1);
    }
}
