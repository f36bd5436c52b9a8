use axum::{extract::State, Json};

use crate::{ApiError, AppState};

/// Aggregate anonymous usage counters.
///
/// # Returns
/// - 200 OK with `{ totalSyncs, totalNotesSynced, uniqueUsers, avgNotesPerSync }`
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let summary = state
        .stats
        .summary()
        .await
        .map_err(ApiError::failed("Failed to fetch stats"))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": summary,
    })))
}
