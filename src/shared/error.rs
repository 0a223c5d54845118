use crate::shared::validation::ValidationFailureKind;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("Validation error: {message}")]
    ValidationError {
        kind: ValidationFailureKind,
        field: Option<String>,
        message: String,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Network error: {0}")]
    TransientNetwork(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(kind: ValidationFailureKind, message: impl Into<String>) -> Self {
        AppError::ValidationError {
            kind,
            field: None,
            message: message.into(),
        }
    }

    pub fn required_field(field: &str) -> Self {
        AppError::ValidationError {
            kind: ValidationFailureKind::RequiredField,
            field: Some(field.to_string()),
            message: format!("{} is required", field_label(field)),
        }
    }

    pub fn already_reviewed() -> Self {
        AppError::Conflict("Already reviewed".to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError { .. } => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::TransientNetwork(_) => "NETWORK_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::SerializationError(_) => "SERIALIZATION_ERROR",
            AppError::DeserializationError(_) => "DESERIALIZATION_ERROR",
            AppError::ConfigurationError(_) => "CONFIGURATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 画面に出す文言。認可エラーは対象の有無を漏らさない。
    pub fn user_message(&self) -> String {
        match self {
            AppError::ValidationError { message, .. } => message.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Conflict(msg) => msg.clone(),
            AppError::TransientNetwork(_) => "Offline: changes will sync when reconnected".into(),
            AppError::Unauthorized(_) => "You do not have permission to do that".into(),
            _ => "Something went wrong".into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::TransientNetwork(_))
    }

    pub fn validation_kind(&self) -> Option<ValidationFailureKind> {
        match self {
            AppError::ValidationError { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

fn field_label(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::DeserializationError(err.to_string())
        } else {
            AppError::TransientNetwork(err.to_string())
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_field_names_the_field() {
        let err = AppError::required_field("last_name");
        assert_eq!(err.user_message(), "Last name is required");
        assert_eq!(
            err.validation_kind(),
            Some(ValidationFailureKind::RequiredField)
        );
    }

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(AppError::TransientNetwork("reset".into()).is_retryable());
        assert!(!AppError::already_reviewed().is_retryable());
        assert!(!AppError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn unauthorized_message_is_generic() {
        let err = AppError::Unauthorized("student 42 belongs to branch 7".into());
        assert!(!err.user_message().contains("42"));
        assert_eq!(err.code(), "UNAUTHORIZED");
    }
}
