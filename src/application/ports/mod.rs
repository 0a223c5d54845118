pub mod auth_gateway;
pub mod object_storage;
pub mod offline_queue_store;
pub mod realtime_gateway;
pub mod row_store;

pub use auth_gateway::{AuthGateway, AuthSession, SignUpRequest};
pub use object_storage::ObjectStorage;
pub use offline_queue_store::OfflineQueueStore;
pub use realtime_gateway::{
    ChangeEvent, ChangeKind, ChannelMessage, ChannelStatus, RealtimeChannel, RealtimeGateway,
};
pub use row_store::{Filter, Query, RowStore};
