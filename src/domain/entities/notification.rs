use crate::domain::value_objects::{NotificationId, PrincipalId, Row};
use crate::shared::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const KIND_APPROVAL: &str = "approval";
pub const KIND_ANNOUNCEMENT: &str = "announcement";
pub const KIND_ORDER: &str = "order";

/// 通知一覧のビュー。キャッシュはユーザーとビューの組で持つ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationView {
    #[default]
    All,
    UnreadOnly,
}

impl NotificationView {
    pub fn admits(&self, record: &NotificationRecord) -> bool {
        match self {
            NotificationView::All => true,
            NotificationView::UnreadOnly => !record.is_read,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub user_id: PrincipalId,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl NotificationRecord {
    pub fn from_row(row: Row) -> Result<Self, AppError> {
        serde_json::from_value(Value::Object(row))
            .map_err(|err| AppError::DeserializationError(err.to_string()))
    }

    /// 受信した行で上書きする。既読は false に戻さない。
    pub fn merge(&mut self, incoming: &NotificationRecord) {
        let was_read = self.is_read;
        *self = incoming.clone();
        self.is_read = was_read || incoming.is_read;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDraft {
    pub user_id: PrincipalId,
    pub kind: String,
    pub message: String,
    pub metadata: Option<Value>,
}

impl NotificationDraft {
    pub fn new(user_id: PrincipalId, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id,
            kind: kind.into(),
            message: message.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn into_row(self, created_at: DateTime<Utc>) -> Row {
        let mut row = Row::new();
        row.insert("user_id".into(), self.user_id.to_value());
        row.insert("type".into(), Value::String(self.kind));
        row.insert("message".into(), Value::String(self.message));
        row.insert("is_read".into(), Value::Bool(false));
        row.insert("created_at".into(), Value::String(created_at.to_rfc3339()));
        if let Some(metadata) = self.metadata {
            row.insert("metadata".into(), metadata);
        }
        row
    }
}
