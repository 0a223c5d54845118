pub mod approval_handler;
pub mod attendance_handler;
pub mod media_handler;
pub mod notification_handler;
pub mod session_handler;

pub use approval_handler::ApprovalHandler;
pub use attendance_handler::AttendanceHandler;
pub use media_handler::MediaHandler;
pub use notification_handler::NotificationHandler;
pub use session_handler::SessionHandler;

use super::dto::Validate;
use crate::shared::error::AppError;
use crate::shared::validation::ValidationFailureKind;

/// 入力検証を実行
pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input.validate().map_err(invalid_input)
}

pub(crate) fn invalid_input(message: String) -> AppError {
    AppError::validation(ValidationFailureKind::Generic, message)
}

pub(crate) fn no_session() -> AppError {
    AppError::Unauthorized("No active session".into())
}
