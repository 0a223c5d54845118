pub mod ports;
pub mod services;

pub use services::{
    ApprovalService,
    AuthService,
    InstructorService,
    MediaService,
    NotificationReconciler,
    NotificationService,
    OfflineQueueService,
    SessionResolver,
};
