use super::row_store::Filter;
use crate::domain::value_objects::Row;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// テーブル変更の通知。DELETE の `old` は主キーしか持たないことがある。
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub old: Option<Row>,
    pub new: Option<Row>,
}

impl ChangeEvent {
    pub fn insert(row: Row) -> Self {
        Self {
            kind: ChangeKind::Insert,
            old: None,
            new: Some(row),
        }
    }

    pub fn update(old: Option<Row>, row: Row) -> Self {
        Self {
            kind: ChangeKind::Update,
            old,
            new: Some(row),
        }
    }

    pub fn delete(old: Row) -> Self {
        Self {
            kind: ChangeKind::Delete,
            old: Some(old),
            new: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    Status(ChannelStatus),
    Change(ChangeEvent),
}

/// 開いたチャネル。送信側が落ちたら受信は None を返す。
#[derive(Debug)]
pub struct RealtimeChannel {
    pub id: String,
    pub messages: mpsc::UnboundedReceiver<ChannelMessage>,
}

#[async_trait]
pub trait RealtimeGateway: Send + Sync {
    async fn open_channel(
        &self,
        name: &str,
        table: &str,
        filter: &Filter,
    ) -> Result<RealtimeChannel, AppError>;
    async fn remove_channel(&self, channel_id: &str) -> Result<(), AppError>;
}
