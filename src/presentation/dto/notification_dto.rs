use super::Validate;
use crate::domain::entities::NotificationRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsRequest {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkNotificationReadRequest {
    pub notification_id: String,
}

impl Validate for MarkNotificationReadRequest {
    fn validate(&self) -> Result<(), String> {
        if self.notification_id.trim().is_empty() {
            return Err("Notification ID is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
    pub metadata: Option<Value>,
}

impl From<NotificationRecord> for NotificationResponse {
    fn from(record: NotificationRecord) -> Self {
        Self {
            id: record.id.to_string(),
            kind: record.kind,
            message: record.message,
            is_read: record.is_read,
            created_at: record.created_at.to_rfc3339(),
            metadata: record.metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishAnnouncementRequest {
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl Validate for PublishAnnouncementRequest {
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Title is required".to_string());
        }
        if self.title.len() > 200 {
            return Err("Title is too long (max 200 characters)".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishAnnouncementResponse {
    pub announcement: Value,
    pub notified: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlacedRequest {
    pub order_number: String,
    pub total: f64,
    pub admin_ids: Vec<String>,
}

impl Validate for OrderPlacedRequest {
    fn validate(&self) -> Result<(), String> {
        if self.order_number.trim().is_empty() {
            return Err("Order number is required".to_string());
        }
        if !self.total.is_finite() || self.total < 0.0 {
            return Err("Total must be a non-negative amount".to_string());
        }
        Ok(())
    }
}
