use crate::domain::entities::{AttendanceMark, OfflineQueueEntry};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 端末ローカルの出欠キュー。`list` は追加順。
#[async_trait]
pub trait OfflineQueueStore: Send + Sync {
    async fn append(&self, mark: &AttendanceMark, queued_at: DateTime<Utc>)
        -> Result<i64, AppError>;
    async fn list(&self) -> Result<Vec<OfflineQueueEntry>, AppError>;
    async fn remove(&self, seq: i64) -> Result<(), AppError>;
    async fn len(&self) -> Result<usize, AppError>;
}
