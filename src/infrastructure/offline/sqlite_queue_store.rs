use super::queries::{
    COUNT_QUEUE_ENTRIES, DELETE_QUEUE_ENTRY, INSERT_QUEUE_ENTRY, SELECT_QUEUE_ENTRIES,
};
use super::rows::QueueEntryRow;
use crate::application::ports::offline_queue_store::OfflineQueueStore;
use crate::domain::entities::{AttendanceMark, OfflineQueueEntry};
use crate::infrastructure::database::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// SQLite に置く出欠キュー。queue_key ごとに独立した列として扱う。
pub struct SqliteQueueStore {
    pool: ConnectionPool,
    queue_key: String,
}

impl SqliteQueueStore {
    pub fn new(pool: ConnectionPool, queue_key: impl Into<String>) -> Self {
        Self {
            pool,
            queue_key: queue_key.into(),
        }
    }
}

#[async_trait]
impl OfflineQueueStore for SqliteQueueStore {
    async fn append(
        &self,
        mark: &AttendanceMark,
        queued_at: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let result = sqlx::query(INSERT_QUEUE_ENTRY)
            .bind(&self.queue_key)
            .bind(mark.student_id.as_str())
            .bind(mark.class_date.format("%Y-%m-%d").to_string())
            .bind(mark.status.as_str())
            .bind(mark.notes.as_deref())
            .bind(mark.marked_by.as_ref().map(|p| p.as_str()))
            .bind(queued_at.timestamp_millis())
            .execute(self.pool.get_pool())
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn list(&self) -> Result<Vec<OfflineQueueEntry>, AppError> {
        let rows = sqlx::query_as::<_, QueueEntryRow>(SELECT_QUEUE_ENTRIES)
            .bind(&self.queue_key)
            .fetch_all(self.pool.get_pool())
            .await?;
        rows.into_iter().map(QueueEntryRow::into_domain).collect()
    }

    async fn remove(&self, seq: i64) -> Result<(), AppError> {
        sqlx::query(DELETE_QUEUE_ENTRY)
            .bind(&self.queue_key)
            .bind(seq)
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    async fn len(&self) -> Result<usize, AppError> {
        let count: i64 = sqlx::query_scalar(COUNT_QUEUE_ENTRIES)
            .bind(&self.queue_key)
            .fetch_one(self.pool.get_pool())
            .await?;
        Ok(count.max(0) as usize)
    }
}
