pub mod approval;
pub mod field_schema;
pub mod ids;

pub use approval::{ApprovalAction, ApprovalStatus, Decision, EntityKind};
pub use field_schema::{EntitySchema, Row};
pub use ids::{BranchId, EntityId, NotificationId, PrincipalId, RequestId};
