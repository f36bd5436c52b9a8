//! Seams between pipeline stages and provider clients.

use async_trait::async_trait;

use crate::models::{CreatedNote, Note, SinkError};

/// Destination that accepts one note per call.
///
/// Failures are returned as [`SinkError`] values so the deliverer can record
/// them per note and keep going.
#[async_trait]
pub trait NoteSink: Send + Sync {
    async fn create_note(&self, note: &Note) -> std::result::Result<CreatedNote, SinkError>;
}
