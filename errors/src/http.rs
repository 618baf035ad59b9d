//! HTTP response mapping for `ApiError` (§7). Mirrors the error-response
//! shape this workspace already uses for its other HTTP surfaces: a flat
//! `{error, code, details?}` body, with the status code picked per variant.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::ApiError;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::InvalidInput { reason } => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", reason.clone(), None)
            }
            Self::Unauthorized { reason } => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", reason.clone(), None)
            }
            Self::NotFound { gmid } => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", format!("no record for {gmid}"), None)
            }
            Self::Conflict { reason } => {
                (StatusCode::CONFLICT, "CONFLICT", reason.clone(), None)
            }
            Self::PayloadTooLarge { size_bytes, max_bytes } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                format!("{size_bytes} bytes exceeds the {max_bytes} byte limit"),
                None
            ),
            Self::UnsupportedMediaType { content_type } => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_MEDIA_TYPE",
                format!("unsupported content type: {content_type}"),
                None
            ),
            Self::RateLimited { retry_after_ms } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "rate limited by the embedding provider".to_string(),
                Some(format!("retry_after_ms={retry_after_ms}"))
            ),
            Self::Dependency(dep) => {
                tracing::error!(error = %dep, "dependency failure");
                (
                    StatusCode::BAD_GATEWAY,
                    "DEPENDENCY_FAILURE",
                    "an upstream dependency failed".to_string(),
                    None
                )
            }
            Self::Internal { reason } => {
                tracing::error!(reason = %reason, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "an internal error occurred".to_string(), None)
            }
        };

        let retry_after = if let Self::RateLimited { retry_after_ms } = &self {
            Some(*retry_after_ms)
        } else {
            None
        };

        let body = ErrorResponse { error: message, code: code.to_string(), details };
        let mut response = (status, Json(body)).into_response();
        if let Some(ms) = retry_after {
            let secs = ms.div_ceil(1000).max(1);
            if let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn not_found_maps_to_404() {
        let response = ApiError::NotFound { gmid: "abc".to_string() }.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn rate_limited_carries_retry_after_header() {
        let response = ApiError::RateLimited { retry_after_ms: 1500 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(axum::http::header::RETRY_AFTER).unwrap(), "2");
    }

    #[test]
    fn internal_error_masks_the_reason() {
        let response = ApiError::Internal { reason: "stack trace details".to_string() }.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
