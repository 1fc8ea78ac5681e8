use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError { message: String },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl PaymentError {
    pub fn provider(provider: &str, message: impl Into<String>, code: Option<String>) -> Self {
        PaymentError::ProviderError {
            provider: provider.to_string(),
            message: message.into(),
            provider_code: code,
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::RateLimitError { .. } => true,
            PaymentError::ProviderError { retryable, .. } => *retryable,
        }
    }

    /// Message safe to return to the caller. Gateway rejections carry the
    /// gateway's own explanation.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::NetworkError { .. } => {
                "Payment gateway is temporarily unavailable".to_string()
            }
            PaymentError::RateLimitError { .. } => {
                "Too many requests to payment gateway. Please retry shortly".to_string()
            }
            PaymentError::ProviderError { message, .. } => {
                if message.trim().is_empty() {
                    "Payment initiation failed".to_string()
                } else {
                    message.clone()
                }
            }
        }
    }

    pub fn provider_code(&self) -> Option<&str> {
        match self {
            PaymentError::ProviderError { provider_code, .. } => provider_code.as_deref(),
            _ => None,
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError};

        let provider = match &err {
            PaymentError::ProviderError { provider, .. } => provider.clone(),
            _ => "phonepe".to_string(),
        };

        AppError::new(AppErrorKind::External(ExternalError::PaymentGateway {
            provider,
            message: err.user_message(),
            is_retryable: err.is_retryable(),
        }))
        .with_context(err.to_string())
    }
}
