use super::Validate;
use crate::application::services::SyncIndicator;
use crate::domain::entities::{AttendanceStatus, AttendanceWriteOutcome, DrainReport};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CLASS_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAttendanceRequest {
    pub student_id: String,
    pub class_date: String,
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Validate for RecordAttendanceRequest {
    fn validate(&self) -> Result<(), String> {
        if self.student_id.trim().is_empty() {
            return Err("Student ID is required".to_string());
        }
        if NaiveDate::parse_from_str(&self.class_date, CLASS_DATE_FORMAT).is_err() {
            return Err(format!("Class date must be YYYY-MM-DD: {}", self.class_date));
        }
        if AttendanceStatus::from_str(&self.status).is_none() {
            return Err(format!("Unknown attendance status: {}", self.status));
        }
        if self.notes.as_ref().is_some_and(|n| n.len() > 1_000) {
            return Err("Notes are too long (max 1000 characters)".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAttendanceResponse {
    pub outcome: AttendanceWriteOutcome,
    pub queued: bool,
}

impl From<AttendanceWriteOutcome> for RecordAttendanceResponse {
    fn from(outcome: AttendanceWriteOutcome) -> Self {
        Self {
            outcome,
            queued: outcome == AttendanceWriteOutcome::Queued,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainOfflineQueueResponse {
    pub replayed: usize,
    pub remaining: usize,
}

impl From<DrainReport> for DrainOfflineQueueResponse {
    fn from(report: DrainReport) -> Self {
        Self {
            replayed: report.replayed,
            remaining: report.remaining,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    pub online: bool,
    pub pending: usize,
    pub label: Option<String>,
}

impl From<SyncIndicator> for SyncStatusResponse {
    fn from(indicator: SyncIndicator) -> Self {
        Self {
            online: indicator.online,
            pending: indicator.pending,
            label: indicator.label().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(date: &str, status: &str) -> RecordAttendanceRequest {
        RecordAttendanceRequest {
            student_id: "42".into(),
            class_date: date.into(),
            status: status.into(),
            notes: None,
        }
    }

    #[test]
    fn class_date_and_status_are_checked() {
        assert!(request("2024-05-06", "late").validate().is_ok());
        assert!(request("06/05/2024", "late").validate().is_err());
        assert!(request("2024-05-06", "excused").validate().is_err());
    }
}
