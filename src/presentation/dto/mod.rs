// DTOモジュール
pub mod approval_dto;
pub mod attendance_dto;
pub mod media_dto;
pub mod notification_dto;
pub mod session_dto;

// 共通のレスポンス型
use crate::shared::AppError;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub error_details: Option<serde_json::Value>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
            error_details: None,
        }
    }

    pub fn from_app_error(error: AppError) -> Self {
        let error_details = match &error {
            AppError::ValidationError { kind, field, .. } => Some(json!({
                "kind": kind.as_str(),
                "field": field,
            })),
            _ => None,
        };

        Self {
            success: false,
            data: None,
            error: Some(error.user_message()),
            error_code: Some(error.code().to_string()),
            error_details,
        }
    }

    pub fn from_result(result: crate::shared::Result<T>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::from_app_error(err),
        }
    }
}

// バリデーショントレイト
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_carry_field_details() {
        let response: ApiResponse<()> =
            ApiResponse::from_result(Err(AppError::required_field("last_name")));
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Last name is required"));
        assert_eq!(response.error_code.as_deref(), Some("VALIDATION_ERROR"));
        let details = response.error_details.unwrap();
        assert_eq!(details["field"], "last_name");
        assert_eq!(details["kind"], "required_field");
    }

    #[test]
    fn conflict_has_no_details() {
        let response: ApiResponse<()> = ApiResponse::from_app_error(AppError::already_reviewed());
        assert_eq!(response.error.as_deref(), Some("Already reviewed"));
        assert!(response.error_details.is_none());
    }
}
