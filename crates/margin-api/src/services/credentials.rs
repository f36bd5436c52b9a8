//! Per-user credential and last-sync persistence.

use std::sync::Arc;

use margin_core::{defaults, Credentials, Result};

use super::kv_store::KvStore;

/// Stores provider credentials and last-sync timestamps by user id.
#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KvStore>,
}

fn credentials_key(user_id: &str) -> String {
    format!("{}:{}", defaults::CREDENTIALS_KEY_PREFIX, user_id)
}

fn last_sync_key(user_id: &str) -> String {
    format!("{}:{}", defaults::LAST_SYNC_KEY_PREFIX, user_id)
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn save_credentials(&self, user_id: &str, credentials: &Credentials) -> Result<()> {
        let value = serde_json::to_string(credentials)?;
        self.kv.set(&credentials_key(user_id), &value).await
    }

    pub async fn get_credentials(&self, user_id: &str) -> Result<Option<Credentials>> {
        match self.kv.get(&credentials_key(user_id)).await? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_credentials(&self, user_id: &str) -> Result<()> {
        self.kv.del(&credentials_key(user_id)).await
    }

    pub async fn save_last_sync(&self, user_id: &str, timestamp: &str) -> Result<()> {
        self.kv.set(&last_sync_key(user_id), timestamp).await
    }

    pub async fn get_last_sync(&self, user_id: &str) -> Result<Option<String>> {
        self.kv.get(&last_sync_key(user_id)).await
    }
}
