//! Mem note creation client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use margin_core::defaults::{
    HTTP_TIMEOUT_SECS, MEM_API_KEY_PREFIX, MEM_BASE_URL, MEM_REQUESTS_PER_WINDOW,
};
use margin_core::{CreatedNote, Error, Note, NoteSink, Result, SinkError};

use crate::provider_error::sink_error;
use crate::rate_limit::RateLimiter;

const PROVIDER: &str = "Mem";

/// Content of the connection-check note.
const TEST_NOTE_CONTENT: &str = "# Readwise Sync Test\n\nConnection verified. You can delete this note.";

#[derive(Debug, Serialize)]
struct CreateNoteRequest<'a> {
    input: &'a str,
}

/// Mem API client owning its own rate limiter.
pub struct MemClient {
    client: Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
}

impl MemClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, MEM_BASE_URL)
    }

    /// Client posting to a custom endpoint (tests, proxies).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            limiter: RateLimiter::per_minute(MEM_REQUESTS_PER_WINDOW),
        })
    }

    /// Whether `api_key` has the shape Mem issues.
    pub fn is_valid_key_format(api_key: &str) -> bool {
        api_key.starts_with(MEM_API_KEY_PREFIX) && api_key.len() > MEM_API_KEY_PREFIX.len()
    }

    /// Create one note. Rate limited.
    #[instrument(skip(self, note), fields(subsystem = "clients", component = "mem", op = "create_note", content_len = note.content.len()))]
    pub async fn create_note(&self, note: &Note) -> std::result::Result<CreatedNote, SinkError> {
        self.limiter.acquire().await;

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&CreateNoteRequest {
                input: &note.content,
            })
            .send()
            .await
            .map_err(|e| SinkError::transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = sink_error(PROVIDER, status.as_u16(), &body);
            warn!(status = status.as_u16(), error = %err.message, "Mem rejected note");
            return Err(err);
        }

        // The note exists once Mem answers 2xx, even if the body is unreadable.
        let created = match response.json::<CreatedNote>().await {
            Ok(created) => created,
            Err(e) => {
                warn!(status = status.as_u16(), error = %e, "Mem accepted note without a readable body");
                CreatedNote::default()
            }
        };

        debug!(note_id = %created.id, "Note created");
        Ok(created)
    }

    /// Verify the key by creating a small test note.
    #[instrument(skip(self), fields(subsystem = "clients", component = "mem", op = "test_connection"))]
    pub async fn test_connection(&self) -> bool {
        let note = Note {
            content: TEST_NOTE_CONTENT.to_string(),
            created_at: None,
        };
        match self.create_note(&note).await {
            Ok(_) => {
                info!("Mem connection check passed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Mem connection check failed");
                false
            }
        }
    }
}

#[async_trait]
impl NoteSink for MemClient {
    async fn create_note(&self, note: &Note) -> std::result::Result<CreatedNote, SinkError> {
        MemClient::create_note(self, note).await
    }
}
