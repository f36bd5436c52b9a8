//! Validation and sync execution handlers.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::warn;

use margin_clients::MemClient;
use margin_core::{Book, Deadline, FetchedData, Highlight, ValidationSummary};
use margin_pipeline::{execute_sync, validate_fetched, BatchDeliverer};

use super::required;
use crate::{ApiError, AppState};

const EXECUTE_FAILED: &str = "Failed to execute sync";

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub highlights: Option<Vec<Highlight>>,
    pub books: Option<Vec<Book>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSyncRequest {
    pub api_key: Option<String>,
    pub validation_summary: Option<ValidationSummary>,
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub group_by_book: bool,
    /// When set, the last-sync timestamp is stored for this user.
    pub user_id: Option<String>,
}

/// Validate fetched highlights.
///
/// # Request Body
/// - `highlights`: Readwise highlights
/// - `books`: Readwise books, used to render content for the length check
///
/// # Returns
/// - 200 OK with the validation summary
/// - 400 Bad Request if either array is missing
pub async fn validate_highlights(
    Json(req): Json<ValidateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let highlights = req
        .highlights
        .ok_or_else(|| ApiError::BadRequest("Highlights array is required".to_string()))?;
    let books = req
        .books
        .ok_or_else(|| ApiError::BadRequest("Books array is required".to_string()))?;

    let summary = validate_fetched(&FetchedData { highlights, books });

    Ok(Json(serde_json::json!({
        "success": true,
        "data": summary,
    })))
}

/// Deliver the valid highlights of a validation summary to Mem.
///
/// # Request Body
/// - `apiKey`: Mem API key
/// - `validationSummary`: output of `/api/sync/validate`
/// - `books`: Readwise books
/// - `groupByBook`: one note per book (optional)
///
/// # Returns
/// - 200 OK with the sync report, including partial failures
/// - 400 Bad Request if inputs are missing or nothing is deliverable
/// - 429 Too Many Requests with the report if the Mem quota stopped every note
pub async fn execute(
    State(state): State<AppState>,
    Json(req): Json<ExecuteSyncRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let api_key = required(req.api_key, "Mem API key is required")?;
    let summary = req
        .validation_summary
        .ok_or_else(|| ApiError::BadRequest("Validation summary is required".to_string()))?;

    let pipeline = &state.config.pipeline;
    let client = MemClient::with_base_url(api_key.as_str(), &pipeline.mem_base_url)
        .map_err(ApiError::failed(EXECUTE_FAILED))?;
    let deliverer = BatchDeliverer::from_config(Arc::new(client), pipeline);
    let deadline = Deadline::after(pipeline.deliver_budget);

    let report = execute_sync(
        &deliverer,
        &summary,
        &req.books,
        req.group_by_book,
        None,
        &deadline,
    )
    .await?;

    state.stats.record_sync(&api_key, report.synced).await;
    if let Some(user_id) = req.user_id.as_deref().filter(|id| !id.is_empty()) {
        if report.synced > 0 {
            let now = chrono::Utc::now().to_rfc3339();
            if let Err(e) = state.credentials.save_last_sync(user_id, &now).await {
                warn!(error = %e, "Failed to store last sync timestamp");
            }
        }
    }

    if report.is_quota_failure() {
        let data = serde_json::to_value(&report)
            .map_err(|e| ApiError::failed(EXECUTE_FAILED)(e.into()))?;
        return Err(ApiError::QuotaExceeded {
            message: report.quota_message(),
            data,
        });
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "data": report,
    })))
}
