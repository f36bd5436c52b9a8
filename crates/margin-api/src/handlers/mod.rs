//! HTTP handlers for margin-api.

pub mod mem;
pub mod readwise;
pub mod schedule;
pub mod stats;
pub mod storage;
pub mod sync;

use crate::ApiError;

/// Treat an absent or empty string field as missing.
pub(crate) fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}
