//! Error response formatting
//!
//! Every failed request gets the same JSON envelope with the HTTP status,
//! error code and user-friendly message derived from [`AppError`].

use crate::error::{AppError, ErrorCode};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Standardized error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Always false; mirrors the `success` flag of successful bodies
    pub success: bool,

    /// Machine-readable error code
    pub error: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Request ID for debugging and support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// ISO 8601 timestamp of the error
    pub timestamp: String,

    /// Whether the client should retry the request
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            success: false,
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: error.is_retryable(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::error!(
                error = ?self.kind,
                context = ?self.context,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = ?self.kind,
                context = ?self.context,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        let error_response = ErrorResponse::from_app_error(&self);
        (status_code, Json(error_response)).into_response()
    }
}

/// Helper to extract request ID from request headers
pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppErrorKind, DomainError, ValidationError};

    #[test]
    fn test_error_response_from_app_error() {
        let app_error = AppError::recharge_not_found("r-1").with_request_id("req_123");

        let error_response = ErrorResponse::from_app_error(&app_error);

        assert!(!error_response.success);
        assert_eq!(error_response.error, ErrorCode::RechargeNotFound);
        assert_eq!(error_response.request_id, Some("req_123".to_string()));
        assert!(!error_response.retryable);
    }

    #[test]
    fn test_error_response_serializes_camel_case() {
        let app_error = AppError::recharge_not_found("r-1").with_request_id("req_123");
        let value = serde_json::to_value(ErrorResponse::from_app_error(&app_error)).unwrap();

        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "RECHARGE_NOT_FOUND");
        assert_eq!(value["requestId"], "req_123");
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn test_app_error_into_response() {
        let app_error = AppError::validation(ValidationError::InvalidAmount {
            amount: "0".to_string(),
            reason: "Amount must be at least 1".to_string(),
        });

        let response = app_error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_conflict_into_response() {
        let app_error = AppError::new(AppErrorKind::Domain(DomainError::InvalidState {
            recharge_id: "r-1".to_string(),
            status: "failed".to_string(),
        }));

        assert_eq!(app_error.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_request_id_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(get_request_id_from_headers(&headers), None);

        headers.insert("x-request-id", "abc".parse().unwrap());
        assert_eq!(get_request_id_from_headers(&headers), Some("abc".to_string()));
    }
}
