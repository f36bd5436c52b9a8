//! Mem HTTP handlers.

use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use margin_clients::MemClient;
use margin_core::{defaults, Note};

use super::required;
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestApiKeyRequest {
    pub api_key: Option<String>,
    /// Create a test note instead of only checking the key's shape.
    #[serde(default)]
    pub verify: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteRequest {
    pub api_key: Option<String>,
    pub note: Option<NoteInput>,
}

#[derive(Debug, Deserialize)]
pub struct NoteInput {
    #[serde(alias = "input")]
    pub content: Option<String>,
}

/// Check a Mem API key.
///
/// # Request Body
/// - `apiKey`: key to check
/// - `verify`: also create a test note (optional, default false)
///
/// # Returns
/// - 200 OK if the key looks valid (and, with `verify`, works)
/// - 400 Bad Request if the key is missing or malformed
/// - 401 Unauthorized if verification fails
pub async fn test_api_key(
    State(state): State<AppState>,
    Json(req): Json<TestApiKeyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let api_key = required(req.api_key, "Mem API key is required")?;
    if api_key.trim().is_empty() {
        return Err(ApiError::BadRequest("Invalid API key format".to_string()));
    }
    if !MemClient::is_valid_key_format(&api_key) {
        return Err(ApiError::BadRequest(format!(
            "API key should start with {}",
            defaults::MEM_API_KEY_PREFIX
        )));
    }

    if !req.verify {
        return Ok(Json(serde_json::json!({
            "success": true,
            "message": "API key format is valid. Will verify during sync.",
        })));
    }

    let client = MemClient::with_base_url(api_key, &state.config.pipeline.mem_base_url)
        .map_err(ApiError::failed("Failed to validate API key"))?;
    let ok = client.test_connection().await;
    info!(
        subsystem = "api",
        event = "connection_tested",
        service = "mem",
        success = ok
    );

    if !ok {
        return Err(ApiError::Unauthorized(
            "Failed to connect to Mem. Please check your API key.".to_string(),
        ));
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Successfully connected to Mem",
    })))
}

/// Create a single note in Mem.
///
/// # Request Body
/// - `apiKey`: Mem API key
/// - `note`: `{ content }`
///
/// # Returns
/// - 200 OK with the created note
/// - 400 Bad Request if the key or content is missing
/// - 429 Too Many Requests if the Mem quota is exhausted
/// - 500 Internal Server Error if Mem rejects the note
pub async fn create_note(
    State(state): State<AppState>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let api_key = required(req.api_key, "Mem API key is required")?;
    let content = required(
        req.note.and_then(|n| n.content),
        "Note content is required",
    )?;

    let client = MemClient::with_base_url(api_key, &state.config.pipeline.mem_base_url)
        .map_err(ApiError::failed("Failed to create note in Mem"))?;
    let created = client
        .create_note(&Note {
            content,
            created_at: None,
        })
        .await
        .map_err(|e| ApiError::sink("Failed to create note in Mem", e))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": created,
    })))
}
