//! Anonymous usage counters.
//!
//! Users are identified only by a truncated SHA-256 of their Mem API key.

use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use margin_core::Result;

use super::kv_store::KvStore;

const TOTAL_SYNCS_KEY: &str = "stats:total_syncs";
const TOTAL_NOTES_KEY: &str = "stats:total_notes";
const UNIQUE_USERS_KEY: &str = "stats:unique_users";
const LAST_SYNC_KEY_PREFIX: &str = "stats:last_sync";

/// Aggregate usage as served by `GET /api/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_syncs: i64,
    pub total_notes_synced: i64,
    pub unique_users: u64,
    pub avg_notes_per_sync: i64,
}

/// First 16 hex chars of the key's SHA-256.
pub fn anonymous_user_id(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[derive(Clone)]
pub struct SyncStats {
    kv: Arc<dyn KvStore>,
}

impl SyncStats {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Record a completed sync. Storage failures are logged and dropped.
    pub async fn record_sync(&self, api_key: &str, synced: usize) {
        if synced == 0 {
            return;
        }
        if let Err(e) = self.try_record_sync(api_key, synced).await {
            warn!(
                subsystem = "api",
                component = "stats",
                error = %e,
                "Failed to record sync stats"
            );
        }
    }

    async fn try_record_sync(&self, api_key: &str, synced: usize) -> Result<()> {
        let user_id = anonymous_user_id(api_key);
        self.kv.incr_by(TOTAL_SYNCS_KEY, 1).await?;
        self.kv.incr_by(TOTAL_NOTES_KEY, synced as i64).await?;
        self.kv.sadd(UNIQUE_USERS_KEY, &user_id).await?;
        self.kv
            .set(
                &format!("{}:{}", LAST_SYNC_KEY_PREFIX, user_id),
                &chrono::Utc::now().to_rfc3339(),
            )
            .await?;
        debug!(user_id = %user_id, synced, "Recorded sync stats");
        Ok(())
    }

    pub async fn summary(&self) -> Result<StatsSummary> {
        let total_syncs = self.counter(TOTAL_SYNCS_KEY).await?;
        let total_notes_synced = self.counter(TOTAL_NOTES_KEY).await?;
        let unique_users = self.kv.scard(UNIQUE_USERS_KEY).await?;

        let avg_notes_per_sync = if total_syncs > 0 {
            (total_notes_synced as f64 / total_syncs as f64).round() as i64
        } else {
            0
        };

        Ok(StatsSummary {
            total_syncs,
            total_notes_synced,
            unique_users,
            avg_notes_per_sync,
        })
    }

    async fn counter(&self, key: &str) -> Result<i64> {
        Ok(self
            .kv
            .get(key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryKvStore;

    #[test]
    fn test_anonymous_user_id_is_stable_and_short() {
        let id = anonymous_user_id("sk-mem-abc");
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, anonymous_user_id("sk-mem-abc"));
        assert_ne!(id, anonymous_user_id("sk-mem-abd"));
    }

    #[tokio::test]
    async fn test_summary_of_empty_store() {
        let stats = SyncStats::new(Arc::new(MemoryKvStore::new()));
        let summary = stats.summary().await.unwrap();
        assert_eq!(summary.total_syncs, 0);
        assert_eq!(summary.avg_notes_per_sync, 0);
    }

    #[tokio::test]
    async fn test_record_sync_accumulates() {
        let kv = Arc::new(MemoryKvStore::new());
        let stats = SyncStats::new(kv.clone());

        stats.record_sync("sk-mem-a", 3).await;
        stats.record_sync("sk-mem-a", 4).await;
        stats.record_sync("sk-mem-b", 0).await;

        let summary = stats.summary().await.unwrap();
        assert_eq!(summary.total_syncs, 2);
        assert_eq!(summary.total_notes_synced, 7);
        assert_eq!(summary.unique_users, 1);
        assert_eq!(summary.avg_notes_per_sync, 4);

        let key = format!("stats:last_sync:{}", anonymous_user_id("sk-mem-a"));
        assert!(kv.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_record_sync_swallows_storage_errors() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(TOTAL_SYNCS_KEY, "not-a-number").await.unwrap();
        let stats = SyncStats::new(kv);

        stats.record_sync("sk-mem-a", 1).await;
    }
}
