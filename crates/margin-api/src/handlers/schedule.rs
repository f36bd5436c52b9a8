//! Automatic sync schedule handlers.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use super::{required, storage::UserQuery};
use crate::services::{ScheduleConfig, ScheduleFrequency};
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub user_id: Option<String>,
    pub frequency: Option<String>,
    /// Anything but an explicit `false` enables the schedule.
    pub enabled: Option<bool>,
}

/// Save a user's sync schedule.
///
/// # Request Body
/// - `userId`: owner of the schedule
/// - `frequency`: `daily`, `weekly` or `manual`
/// - `enabled`: optional, defaults to true
///
/// # Returns
/// - 200 OK with the stored schedule
/// - 400 Bad Request if the user id or frequency is missing or invalid
pub async fn save_schedule(
    State(state): State<AppState>,
    Json(req): Json<ScheduleRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = required(req.user_id, "User ID is required")?;
    let frequency = req
        .frequency
        .as_deref()
        .and_then(ScheduleFrequency::parse)
        .ok_or_else(|| {
            ApiError::BadRequest(
                "Valid frequency is required (daily, weekly, or manual)".to_string(),
            )
        })?;
    let enabled = req.enabled != Some(false);

    let config = ScheduleConfig::new(user_id, frequency, enabled, chrono::Utc::now());
    state
        .schedules
        .save(&config)
        .await
        .map_err(ApiError::failed("Failed to schedule sync"))?;

    let message = if enabled {
        format!("Automatic sync scheduled ({})", frequency.as_str())
    } else {
        "Automatic sync disabled".to_string()
    };

    Ok(Json(serde_json::json!({
        "success": true,
        "data": config,
        "message": message,
    })))
}

/// Load a user's sync schedule, defaulting to manual and disabled.
pub async fn get_schedule(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = required(query.user_id, "User ID is required")?;
    let config = state
        .schedules
        .get(&user_id)
        .await
        .map_err(ApiError::failed("Failed to get schedule"))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": config,
    })))
}
