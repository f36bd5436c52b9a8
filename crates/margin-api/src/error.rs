//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use margin_core::SinkError;

/// Error returned by handlers; renders as `{ "error": ..., "details"?: ... }`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    TooManyRequests(String),
    /// Quota exhausted with nothing delivered; the partial report rides along.
    QuotaExceeded {
        message: String,
        data: serde_json::Value,
    },
    /// A handler step failed; `context` is the user-facing summary.
    Failed {
        status: StatusCode,
        context: &'static str,
        details: String,
    },
    Internal(margin_core::Error),
}

impl ApiError {
    /// `map_err` adapter attaching a user-facing context to a core error.
    pub fn failed(context: &'static str) -> impl FnOnce(margin_core::Error) -> Self {
        move |source| {
            let status = match source {
                margin_core::Error::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            ApiError::Failed {
                status,
                context,
                details: source.to_string(),
            }
        }
    }

    /// Map a single-note sink failure; quota exhaustion keeps its 429.
    pub fn sink(context: &'static str, err: SinkError) -> Self {
        if err.quota_body().is_some() {
            return ApiError::TooManyRequests(err.message);
        }
        ApiError::Failed {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            context,
            details: err.message,
        }
    }
}

impl From<margin_core::Error> for ApiError {
    fn from(err: margin_core::Error) -> Self {
        match err {
            margin_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            margin_core::Error::QuotaExceeded(msg) => ApiError::TooManyRequests(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, serde_json::json!({ "error": msg }))
            }
            ApiError::TooManyRequests(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, serde_json::json!({ "error": msg }))
            }
            ApiError::QuotaExceeded { message, data } => (
                StatusCode::TOO_MANY_REQUESTS,
                serde_json::json!({ "success": false, "error": message, "data": data }),
            ),
            ApiError::Failed {
                status,
                context,
                details,
            } => {
                error!(details = %details, "{}", context);
                (
                    status,
                    serde_json::json!({ "error": context, "details": details }),
                )
            }
            ApiError::Internal(err) => {
                error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": err.to_string() }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
