use crate::domain::entities::{AttendanceMark, AttendanceStatus, OfflineQueueEntry};
use crate::domain::value_objects::{EntityId, PrincipalId};
use crate::shared::error::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueueEntryRow {
    pub seq: i64,
    pub student_id: String,
    pub class_date: String,
    pub status: String,
    pub notes: Option<String>,
    pub marked_by: Option<String>,
    pub queued_at: i64,
}

impl QueueEntryRow {
    pub fn into_domain(self) -> Result<OfflineQueueEntry, AppError> {
        let corrupt = |detail: String| {
            AppError::DeserializationError(format!("queue entry {}: {detail}", self.seq))
        };
        let student_id = EntityId::new(self.student_id.clone()).map_err(corrupt)?;
        let class_date = NaiveDate::parse_from_str(&self.class_date, "%Y-%m-%d")
            .map_err(|err| corrupt(err.to_string()))?;
        let status = AttendanceStatus::from_str(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status {}", self.status)))?;
        let marked_by = match self.marked_by.clone() {
            Some(value) => Some(PrincipalId::new(value).map_err(corrupt)?),
            None => None,
        };
        let queued_at = DateTime::<Utc>::from_timestamp_millis(self.queued_at)
            .ok_or_else(|| corrupt("invalid queued_at".into()))?;

        Ok(OfflineQueueEntry {
            seq: self.seq,
            mark: AttendanceMark {
                student_id,
                class_date,
                status,
                notes: self.notes,
                marked_by,
            },
            queued_at,
        })
    }
}
