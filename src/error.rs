//! Unified error handling for the recharge service
//!
//! Every failure that can reach an HTTP client is folded into [`AppError`], which
//! knows its status code, machine-readable error code, user-facing message and
//! whether the client may retry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "RECHARGE_NOT_FOUND")]
    RechargeNotFound,
    #[serde(rename = "USER_NOT_FOUND")]
    UserNotFound,
    #[serde(rename = "INVALID_STATE")]
    InvalidState,
    #[serde(rename = "INVALID_AMOUNT")]
    InvalidAmount,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors
    #[serde(rename = "PAYMENT_GATEWAY_ERROR")]
    PaymentGatewayError,

    // Generic
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business rule violations around recharge records
#[derive(Debug, Clone)]
pub enum DomainError {
    /// No recharge record with this id / merchant transaction id
    RechargeNotFound { recharge_id: String },
    /// Owner of a record or caller does not exist
    UserNotFound { user_id: String },
    /// Terminal transition attempted on a record that is no longer pending
    InvalidState { recharge_id: String, status: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

/// Payment gateway failures
#[derive(Debug, Clone)]
pub enum ExternalError {
    PaymentGateway {
        provider: String,
        message: String,
        is_retryable: bool,
    },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Amount is non-numeric, missing or below the minimum
    InvalidAmount { amount: String, reason: String },
    /// Required field missing
    MissingField { field: String },
    /// Field value out of acceptable range
    OutOfRange {
        field: String,
        min: Option<String>,
        max: Option<String>,
    },
    /// Field present but not in the expected shape
    InvalidFormat { field: String, reason: String },
    /// Authenticated caller has no user row
    UnknownUser { user_id: String },
}

/// Caller identity problems
#[derive(Debug, Clone)]
pub enum AuthError {
    Unauthorized { reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
    Auth(AuthError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn validation(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Auth(AuthError::Unauthorized {
            reason: reason.into(),
        }))
    }

    pub fn recharge_not_found(recharge_id: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::RechargeNotFound {
            recharge_id: recharge_id.into(),
        }))
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::RechargeNotFound { .. } => 404,
                DomainError::UserNotFound { .. } => 404,
                DomainError::InvalidState { .. } => 409, // Conflict
            },
            AppErrorKind::Infrastructure(_) => 500,
            // Gateway rejections are reported to the caller as bad requests
            AppErrorKind::External(ExternalError::PaymentGateway { .. }) => 400,
            AppErrorKind::Validation(_) => 400,
            AppErrorKind::Auth(_) => 401,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::RechargeNotFound { .. } => ErrorCode::RechargeNotFound,
                DomainError::UserNotFound { .. } => ErrorCode::UserNotFound,
                DomainError::InvalidState { .. } => ErrorCode::InvalidState,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(_) => ErrorCode::PaymentGatewayError,
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
                _ => ErrorCode::ValidationError,
            },
            AppErrorKind::Auth(_) => ErrorCode::Unauthorized,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::RechargeNotFound { .. } => "Recharge not found".to_string(),
                DomainError::UserNotFound { .. } => "User not found".to_string(),
                DomainError::InvalidState {
                    recharge_id,
                    status,
                } => {
                    format!("Recharge '{}' is already {}", recharge_id, status)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(ExternalError::PaymentGateway { message, .. }) => {
                if message.is_empty() {
                    "Payment initiation failed".to_string()
                } else {
                    message.clone()
                }
            }
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::OutOfRange { field, min, max } => match (min, max) {
                    (Some(min), Some(max)) => {
                        format!("Field '{}' must be between {} and {}", field, min, max)
                    }
                    (Some(min), None) => {
                        format!("Field '{}' must be at least {}", field, min)
                    }
                    (None, Some(max)) => {
                        format!("Field '{}' must be at most {}", field, max)
                    }
                    (None, None) => {
                        format!("Field '{}' is out of acceptable range", field)
                    }
                },
                ValidationError::InvalidFormat { field, reason } => {
                    format!("Invalid '{}': {}", field, reason)
                }
                ValidationError::UnknownUser { .. } => "Invalid request parameters".to_string(),
            },
            AppErrorKind::Auth(_) => "Authentication required".to_string(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(ExternalError::PaymentGateway { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::Validation(_) => false,
            AppErrorKind::Auth(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError> lives in database/error.rs, From<PaymentError> in payments/error.rs

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recharge_not_found_error() {
        let error = AppError::recharge_not_found("abc");

        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), ErrorCode::RechargeNotFound);
        assert_eq!(error.user_message(), "Recharge not found");
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_invalid_state_is_conflict() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::InvalidState {
            recharge_id: "r-1".to_string(),
            status: "completed".to_string(),
        }));

        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), ErrorCode::InvalidState);
        assert!(error.user_message().contains("already completed"));
    }

    #[test]
    fn test_gateway_error_is_bad_request_with_gateway_message() {
        let error = AppError::new(AppErrorKind::External(ExternalError::PaymentGateway {
            provider: "phonepe".to_string(),
            message: "Merchant is not registered".to_string(),
            is_retryable: false,
        }));

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::PaymentGatewayError);
        assert_eq!(error.user_message(), "Merchant is not registered");
    }

    #[test]
    fn test_validation_error() {
        let error = AppError::validation(ValidationError::InvalidAmount {
            amount: "0".to_string(),
            reason: "Amount must be at least 1".to_string(),
        });

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::InvalidAmount);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_unknown_user_hides_details() {
        let error = AppError::validation(ValidationError::UnknownUser {
            user_id: "u-1".to_string(),
        });

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.user_message(), "Invalid request parameters");
    }

    #[test]
    fn test_infrastructure_errors_are_generic() {
        let error = AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            message: "connection refused".to_string(),
            is_retryable: true,
        }));

        assert_eq!(error.status_code(), 500);
        assert!(!error.user_message().contains("connection refused"));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_unauthorized() {
        let error = AppError::unauthorized("missing bearer token");
        assert_eq!(error.status_code(), 401);
        assert_eq!(error.error_code(), ErrorCode::Unauthorized);
    }
}
