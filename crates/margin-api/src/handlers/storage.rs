//! Credential storage handlers.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use margin_core::Credentials;

use super::required;
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCredentialsRequest {
    pub user_id: Option<String>,
    pub credentials: Option<CredentialsInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsInput {
    pub readwise_token: Option<String>,
    pub mem_api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: Option<String>,
}

/// Store both provider credentials for a user.
///
/// # Returns
/// - 200 OK on success
/// - 400 Bad Request if the user id or either credential is missing
pub async fn save_credentials(
    State(state): State<AppState>,
    Json(req): Json<SaveCredentialsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = required(req.user_id, "User ID is required")?;

    let missing = "Both Readwise token and Mem API key are required";
    let input = req
        .credentials
        .ok_or_else(|| ApiError::BadRequest(missing.to_string()))?;
    let credentials = Credentials {
        readwise_token: required(input.readwise_token, missing)?,
        mem_api_key: required(input.mem_api_key, missing)?,
    };

    state
        .credentials
        .save_credentials(&user_id, &credentials)
        .await
        .map_err(ApiError::failed("Failed to save credentials"))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Credentials saved successfully",
    })))
}

/// Load a user's stored credentials.
///
/// # Query Parameters
/// - `userId`: user to look up
///
/// # Returns
/// - 200 OK with the credentials, or `data: null` when none are stored
/// - 400 Bad Request if `userId` is missing
pub async fn get_credentials(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = required(query.user_id, "User ID is required")?;

    let credentials = state
        .credentials
        .get_credentials(&user_id)
        .await
        .map_err(ApiError::failed("Failed to retrieve credentials"))?;

    Ok(Json(match credentials {
        Some(credentials) => serde_json::json!({
            "success": true,
            "data": credentials,
        }),
        None => serde_json::json!({
            "success": true,
            "data": null,
            "message": "No credentials found",
        }),
    }))
}
