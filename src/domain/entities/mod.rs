pub mod approval_request;
pub mod attendance;
pub mod instructor;
pub mod notification;
pub mod session;

pub use approval_request::{ApprovalDraft, ApprovalRequest};
pub use attendance::{
    AttendanceMark, AttendanceStatus, AttendanceWriteOutcome, DrainReport, OfflineQueueEntry,
};
pub use instructor::{InstructorRecord, ProfileInput};
pub use notification::{NotificationDraft, NotificationRecord, NotificationView};
pub use session::{Feature, Principal, Role, RoleClaims, SessionContext};
