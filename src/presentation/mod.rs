pub mod dto;
pub mod handlers;

pub use handlers::{
    ApprovalHandler, AttendanceHandler, MediaHandler, NotificationHandler, SessionHandler,
};
