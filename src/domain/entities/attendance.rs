use crate::domain::value_objects::{EntityId, PrincipalId, Row};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "late" => Some(AttendanceStatus::Late),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceMark {
    pub student_id: EntityId,
    pub class_date: NaiveDate,
    #[serde(default)]
    pub status: AttendanceStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub marked_by: Option<PrincipalId>,
}

impl AttendanceMark {
    pub fn new(student_id: EntityId, class_date: NaiveDate, status: AttendanceStatus) -> Self {
        Self {
            student_id,
            class_date,
            status,
            notes: None,
            marked_by: None,
        }
    }

    pub fn marked_by(mut self, principal: PrincipalId) -> Self {
        self.marked_by = Some(principal);
        self
    }

    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert("student_id".into(), self.student_id.to_value());
        row.insert(
            "class_date".into(),
            Value::String(self.class_date.format("%Y-%m-%d").to_string()),
        );
        row.insert("status".into(), Value::String(self.status.as_str().into()));
        row.insert(
            "notes".into(),
            self.notes.clone().map(Value::String).unwrap_or(Value::Null),
        );
        row.insert(
            "marked_by".into(),
            self.marked_by
                .as_ref()
                .map(PrincipalId::to_value)
                .unwrap_or(Value::Null),
        );
        row
    }
}

/// 端末ローカルに溜めた出欠。seq はキュー内の順序。
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineQueueEntry {
    pub seq: i64,
    pub mark: AttendanceMark,
    pub queued_at: DateTime<Utc>,
}

/// 出欠書き込みの結果。Queued は UI 上は成功扱い。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceWriteOutcome {
    Written,
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrainReport {
    pub replayed: usize,
    pub remaining: usize,
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}
