//! Readwise HTTP handlers.

use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use margin_clients::ReadwiseClient;
use margin_core::{DateRange, Deadline};

use super::required;
use crate::{ApiError, AppState};

const FETCH_FAILED: &str = "Failed to fetch highlights from Readwise";

/// Request body for fetching highlights.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchHighlightsRequest {
    pub token: Option<String>,
    /// Inclusive `YYYY-MM-DD` bounds on `highlighted_at`.
    pub date_range: Option<DateRange>,
    /// RFC 3339 lower bound on `updated`; ignored with a date range.
    pub updated_after: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestConnectionRequest {
    pub token: Option<String>,
}

/// Fetch highlights and books from Readwise.
///
/// # Request Body
/// - `token`: Readwise access token
/// - `dateRange`: `{ start, end }` (optional)
/// - `updatedAfter`: incremental lower bound (optional)
///
/// # Returns
/// - 200 OK with `{ highlights, books, count }`
/// - 400 Bad Request if the token is missing or the range is inverted
/// - 500 Internal Server Error if Readwise fails
/// - 504 Gateway Timeout if the fetch budget runs out
pub async fn fetch_highlights(
    State(state): State<AppState>,
    Json(req): Json<FetchHighlightsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = required(req.token, "Readwise token is required")?;
    if let Some(range) = req.date_range {
        if range.start > range.end {
            return Err(ApiError::BadRequest(
                "Start date must be before end date".to_string(),
            ));
        }
    }

    let pipeline = &state.config.pipeline;
    let client = ReadwiseClient::with_base_url(token, &pipeline.readwise_base_url)
        .map_err(ApiError::failed(FETCH_FAILED))?;
    let deadline = Deadline::after(pipeline.fetch_budget);

    let highlights = match req.date_range {
        Some(range) => {
            client
                .fetch_highlights_by_date_range(range, None, &deadline)
                .await
        }
        None => {
            client
                .fetch_all_highlights(None, req.updated_after.as_deref(), &deadline)
                .await
        }
    }
    .map_err(ApiError::failed(FETCH_FAILED))?;
    let books = client
        .fetch_books(&deadline)
        .await
        .map_err(ApiError::failed(FETCH_FAILED))?;

    let count = highlights.len();
    info!(
        subsystem = "api",
        event = "highlights_fetched",
        count,
        book_count = books.len(),
        "Fetched highlights"
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "data": {
            "highlights": highlights,
            "books": books,
            "count": count,
        }
    })))
}

/// Check a Readwise token.
///
/// # Returns
/// - 200 OK when Readwise accepts the token
/// - 400 Bad Request if the token is missing
/// - 401 Unauthorized otherwise
pub async fn test_connection(
    State(state): State<AppState>,
    Json(req): Json<TestConnectionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = required(req.token, "Readwise token is required")?;
    let client = ReadwiseClient::with_base_url(token, &state.config.pipeline.readwise_base_url)
        .map_err(ApiError::failed("Failed to test Readwise connection"))?;

    let ok = client.test_connection().await;
    info!(
        subsystem = "api",
        event = "connection_tested",
        service = "readwise",
        success = ok
    );

    if !ok {
        return Err(ApiError::Unauthorized(
            "Failed to connect to Readwise. Please check your token.".to_string(),
        ));
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Successfully connected to Readwise",
    })))
}
