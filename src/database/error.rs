//! Storage-layer errors and their mapping into [`AppError`]

use crate::error::{AppError, AppErrorKind, DomainError, InfrastructureError, ValidationError};
use std::fmt;

#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

#[derive(Debug, Clone)]
pub enum DatabaseErrorKind {
    NotFound { entity: String, id: String },
    UniqueViolation { constraint: String },
    ForeignKeyViolation { constraint: String },
    /// CHECK constraint rejected the row, or a value failed local validation
    ConstraintViolation { message: String },
    /// Terminal transition on a record that already left `pending`
    InvalidState { id: String, status: String },
    ConnectionError { message: String },
    Unknown { message: String },
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })
    }

    pub fn invalid_state(id: impl ToString, status: impl ToString) -> Self {
        Self::new(DatabaseErrorKind::InvalidState {
            id: id.to_string(),
            status: status.to_string(),
        })
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            },
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or_default().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseErrorKind::UniqueViolation { constraint },
                    Some("23503") => DatabaseErrorKind::ForeignKeyViolation { constraint },
                    Some("23514") => DatabaseErrorKind::ConstraintViolation {
                        message: db_err.message().to_string(),
                    },
                    _ => DatabaseErrorKind::Unknown {
                        message: db_err.message().to_string(),
                    },
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseErrorKind::ConnectionError {
                    message: err.to_string(),
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };

        Self { kind }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::ConnectionError { .. })
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DatabaseErrorKind::NotFound { entity, id } => write!(f, "{} '{}' not found", entity, id),
            DatabaseErrorKind::UniqueViolation { constraint } => {
                write!(f, "unique constraint violated: {}", constraint)
            }
            DatabaseErrorKind::ForeignKeyViolation { constraint } => {
                write!(f, "foreign key violated: {}", constraint)
            }
            DatabaseErrorKind::ConstraintViolation { message } => {
                write!(f, "constraint violated: {}", message)
            }
            DatabaseErrorKind::InvalidState { id, status } => {
                write!(f, "record '{}' is already {}", id, status)
            }
            DatabaseErrorKind::ConnectionError { message } => {
                write!(f, "connection error: {}", message)
            }
            DatabaseErrorKind::Unknown { message } => write!(f, "database error: {}", message),
        }
    }
}

impl std::error::Error for DatabaseError {}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        DatabaseError::from_sqlx(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let is_retryable = err.is_retryable();
        let kind = match err.kind {
            DatabaseErrorKind::NotFound { entity, id } if entity == "user" => {
                AppErrorKind::Domain(DomainError::UserNotFound { user_id: id })
            }
            DatabaseErrorKind::NotFound { id, .. } => {
                AppErrorKind::Domain(DomainError::RechargeNotFound { recharge_id: id })
            }
            DatabaseErrorKind::InvalidState { id, status } => {
                AppErrorKind::Domain(DomainError::InvalidState {
                    recharge_id: id,
                    status,
                })
            }
            DatabaseErrorKind::ConstraintViolation { message } => {
                AppErrorKind::Validation(ValidationError::InvalidFormat {
                    field: "amount".to_string(),
                    reason: message,
                })
            }
            DatabaseErrorKind::ForeignKeyViolation { constraint } => {
                AppErrorKind::Validation(ValidationError::UnknownUser {
                    user_id: constraint,
                })
            }
            other => AppErrorKind::Infrastructure(InfrastructureError::Database {
                message: DatabaseError::new(other).to_string(),
                is_retryable,
            }),
        };

        AppError::new(kind)
    }
}
