//! Decoding of provider error bodies.
//!
//! Providers return several error envelopes. They are decoded into typed
//! shapes, tried in order, and never walked as untyped JSON.

use serde::Deserialize;

use margin_core::defaults::QUOTA_EXCEEDED_TYPE;
use margin_core::{ProviderFailure, QuotaErrorBody, SinkError};

const UNKNOWN_ERROR: &str = "Unknown error";

/// `{"error": {"type": ..., ...}}`
#[derive(Debug, Deserialize)]
struct QuotaEnvelope {
    error: QuotaErrorBody,
}

/// `{"error": "message"}`
#[derive(Debug, Deserialize)]
struct FlatErrorEnvelope {
    error: String,
}

/// `{"error": {"message": "..."}}`
#[derive(Debug, Deserialize)]
struct NestedErrorEnvelope {
    error: MessageOnly,
}

/// `{"message": "..."}` or `{"detail": "..."}`
#[derive(Debug, Deserialize)]
struct MessageOnly {
    #[serde(alias = "detail")]
    message: String,
}

/// Human-readable message from an error body.
///
/// Falls back to the trimmed body text, then to "Unknown error".
pub fn extract_message(body: &str) -> String {
    if let Ok(env) = serde_json::from_str::<FlatErrorEnvelope>(body) {
        return env.error;
    }
    if let Ok(env) = serde_json::from_str::<NestedErrorEnvelope>(body) {
        return env.error.message;
    }
    if let Ok(env) = serde_json::from_str::<QuotaEnvelope>(body) {
        if let Some(message) = env.error.message {
            return message;
        }
    }
    if let Ok(env) = serde_json::from_str::<MessageOnly>(body) {
        return env.message;
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Classify a sink error body.
pub fn decode_failure(body: &str) -> ProviderFailure {
    match serde_json::from_str::<QuotaEnvelope>(body) {
        Ok(env) if env.error.error_type == QUOTA_EXCEEDED_TYPE => ProviderFailure::Quota(env.error),
        _ => ProviderFailure::Unknown(extract_message(body)),
    }
}

/// Build the per-note failure for a non-success sink response.
pub fn sink_error(provider: &str, status: u16, body: &str) -> SinkError {
    let failure = decode_failure(body);
    let detail = match &failure {
        ProviderFailure::Quota(quota) => quota
            .message
            .clone()
            .unwrap_or_else(|| QUOTA_EXCEEDED_TYPE.to_string()),
        ProviderFailure::Unknown(message) => message.clone(),
    };
    SinkError {
        error: failure,
        message: format!("{} returned {}: {}", provider, status, detail),
        status_code: Some(status),
    }
}
