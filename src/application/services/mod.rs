pub mod approval_service;
pub mod auth_service;
pub mod instructor_service;
pub mod media_service;
pub mod notification_reconciler;
pub mod notification_service;
pub mod offline_queue_service;
pub mod session_resolver;

pub use approval_service::{ApprovalService, ApprovalServiceTrait};
pub use auth_service::AuthService;
pub use instructor_service::InstructorService;
pub use media_service::MediaService;
pub use notification_reconciler::{
    NotificationListener, NotificationReconciler, NotificationSubscription, SubscriptionPhase,
};
pub use notification_service::NotificationService;
pub use offline_queue_service::{ConnectivityMonitor, OfflineQueueService, SyncIndicator};
pub use session_resolver::SessionResolver;
