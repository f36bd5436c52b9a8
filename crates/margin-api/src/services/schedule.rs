//! Automatic sync schedule records.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use margin_core::{defaults, Result};

use super::kv_store::KvStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleFrequency {
    Daily,
    Weekly,
    Manual,
}

impl ScheduleFrequency {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Manual => "manual",
        }
    }

    fn interval(self) -> Option<Duration> {
        match self {
            Self::Daily => Some(Duration::days(1)),
            Self::Weekly => Some(Duration::days(7)),
            Self::Manual => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    pub user_id: String,
    pub frequency: ScheduleFrequency,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_sync: Option<String>,
}

impl ScheduleConfig {
    /// Schedule saved at `now`. `next_sync` is set only for enabled periodic schedules.
    pub fn new(
        user_id: impl Into<String>,
        frequency: ScheduleFrequency,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let next_sync = frequency
            .interval()
            .filter(|_| enabled)
            .map(|interval| (now + interval).to_rfc3339());
        Self {
            user_id: user_id.into(),
            frequency,
            enabled,
            last_sync: Some(now.to_rfc3339()),
            next_sync,
        }
    }

    /// What a user without a stored schedule gets.
    pub fn manual(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            frequency: ScheduleFrequency::Manual,
            enabled: false,
            last_sync: None,
            next_sync: None,
        }
    }
}

#[derive(Clone)]
pub struct ScheduleStore {
    kv: Arc<dyn KvStore>,
}

fn schedule_key(user_id: &str) -> String {
    format!("{}:{}", defaults::SCHEDULE_KEY_PREFIX, user_id)
}

impl ScheduleStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn save(&self, config: &ScheduleConfig) -> Result<()> {
        let value = serde_json::to_string(config)?;
        self.kv.set(&schedule_key(&config.user_id), &value).await
    }

    /// Stored schedule, or the manual default.
    pub async fn get(&self, user_id: &str) -> Result<ScheduleConfig> {
        match self.kv.get(&schedule_key(user_id)).await? {
            Some(value) => Ok(serde_json::from_str(&value)?),
            None => Ok(ScheduleConfig::manual(user_id)),
        }
    }
}
