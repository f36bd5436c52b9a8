//! Key-value storage for credentials, schedules and usage counters.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `REDIS_ENABLED`: Set to "false" to use the in-memory store (default: true)
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)
//!
//! When Redis is disabled or unreachable the server falls back to
//! [`MemoryKvStore`], which loses everything on restart.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{info, warn};

use margin_core::{defaults, Error, Result};

/// Minimal key-value operations used by the storage services.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;
    /// Add `delta` to an integer counter, creating it at zero; returns the new value.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;
    /// Add `member` to a set; returns whether it was newly added.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;
    /// Number of members in a set (0 when absent).
    async fn scard(&self, key: &str) -> Result<u64>;
}

/// Pick the store from the environment, falling back to memory.
pub async fn kv_store_from_env() -> Arc<dyn KvStore> {
    let enabled = std::env::var("REDIS_ENABLED")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true);

    if !enabled {
        info!("Redis disabled via REDIS_ENABLED=false, using in-memory store");
        return Arc::new(MemoryKvStore::new());
    }

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| defaults::REDIS_URL.to_string());
    match RedisKvStore::connect(&redis_url).await {
        Ok(store) => {
            info!(
                "Redis store enabled (URL: {})",
                redis_url.replace(|c: char| c.is_ascii_alphanumeric(), "*")
            );
            Arc::new(store)
        }
        Err(e) => {
            warn!("Failed to connect to Redis, using in-memory store: {}", e);
            Arc::new(MemoryKvStore::new())
        }
    }
}

// =============================================================================
// REDIS
// =============================================================================

/// Store backed by a Redis connection manager.
#[derive(Clone)]
pub struct RedisKvStore {
    connection: ConnectionManager,
}

fn storage_err(e: redis::RedisError) -> Error {
    Error::Storage(e.to_string())
}

impl RedisKvStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Config(format!("Invalid Redis URL: {}", e)))?;
        let connection = ConnectionManager::new(client).await.map_err(storage_err)?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get(key).await.map_err(storage_err)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set(key, value).await.map_err(storage_err)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.del(key).await.map_err(storage_err)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.connection.clone();
        conn.incr(key, delta).await.map_err(storage_err)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let added: i64 = conn.sadd(key, member).await.map_err(storage_err)?;
        Ok(added > 0)
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        conn.scard(key).await.map_err(storage_err)
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

enum Entry {
    Value(String),
    Set(HashSet<String>),
}

/// Process-local store used when Redis is unavailable, and in tests.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn wrong_type(key: &str) -> Error {
    Error::Storage(format!("Key '{}' holds the wrong kind of value", key))
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entries.lock().await.get(key) {
            None => Ok(None),
            Some(Entry::Value(v)) => Ok(Some(v.clone())),
            Some(Entry::Set(_)) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), Entry::Value(value.to_string()));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        let current = match entries.get(key) {
            None => 0,
            Some(Entry::Value(v)) => v
                .parse::<i64>()
                .map_err(|_| Error::Storage(format!("Key '{}' is not an integer", key)))?,
            Some(Entry::Set(_)) => return Err(wrong_type(key)),
        };
        let next = current + delta;
        entries.insert(key.to_string(), Entry::Value(next.to_string()));
        Ok(next)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(HashSet::new()))
        {
            Entry::Set(set) => Ok(set.insert(member.to_string())),
            Entry::Value(_) => Err(wrong_type(key)),
        }
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        match self.entries.lock().await.get(key) {
            None => Ok(0),
            Some(Entry::Set(set)) => Ok(set.len() as u64),
            Some(Entry::Value(_)) => Err(wrong_type(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_values() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.del("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_counters() {
        let store = MemoryKvStore::new();
        assert_eq!(store.incr_by("n", 1).await.unwrap(), 1);
        assert_eq!(store.incr_by("n", 5).await.unwrap(), 6);
        assert_eq!(store.get("n").await.unwrap().as_deref(), Some("6"));

        store.set("text", "abc").await.unwrap();
        assert!(store.incr_by("text", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_sets() {
        let store = MemoryKvStore::new();
        assert_eq!(store.scard("s").await.unwrap(), 0);
        assert!(store.sadd("s", "x").await.unwrap());
        assert!(!store.sadd("s", "x").await.unwrap());
        assert!(store.sadd("s", "y").await.unwrap());
        assert_eq!(store.scard("s").await.unwrap(), 2);
        assert!(store.get("s").await.is_err());
    }
}
