mod queries;
pub mod rows;
pub mod sqlite_queue_store;

pub use sqlite_queue_store::SqliteQueueStore;
