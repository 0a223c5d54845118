use super::instructor_service::InstructorService;
use crate::application::ports::row_store::{Filter, Query, RowStore};
use crate::domain::entities::notification::{KIND_ANNOUNCEMENT, KIND_ORDER};
use crate::domain::entities::{NotificationDraft, NotificationRecord, NotificationView};
use crate::domain::value_objects::{EntityId, NotificationId, PrincipalId, Row};
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NOTIFICATIONS_TABLE: &str = "notifications";
pub const ANNOUNCEMENTS_TABLE: &str = "announcements";

#[derive(Debug, Clone, PartialEq)]
pub struct OrderPlaced {
    pub order_number: String,
    pub total: f64,
    pub instructor_id: Option<EntityId>,
}

pub struct NotificationService {
    rows: Arc<dyn RowStore>,
    fetch_limit: u32,
}

impl NotificationService {
    pub fn new(rows: Arc<dyn RowStore>, fetch_limit: u32) -> Self {
        Self { rows, fetch_limit }
    }

    /// 新しい順に最大 fetch_limit 件。
    pub async fn list(
        &self,
        user_id: &PrincipalId,
        view: NotificationView,
    ) -> Result<Vec<NotificationRecord>, AppError> {
        let mut filter = Filter::new().eq("user_id", user_id.to_value());
        if view == NotificationView::UnreadOnly {
            filter = filter.eq("is_read", false);
        }
        let rows = self
            .rows
            .select(
                NOTIFICATIONS_TABLE,
                &Query::filtered(filter)
                    .order_by("created_at", false)
                    .limit(self.fetch_limit),
            )
            .await?;
        rows.into_iter().map(NotificationRecord::from_row).collect()
    }

    pub async fn unread_count(&self, user_id: &PrincipalId) -> Result<usize, AppError> {
        let rows = self
            .rows
            .select(
                NOTIFICATIONS_TABLE,
                &Query::filtered(
                    Filter::new()
                        .eq("user_id", user_id.to_value())
                        .eq("is_read", false),
                ),
            )
            .await?;
        Ok(rows.len())
    }

    /// 本人宛てのものだけ。他人宛ては存在しない場合と同じ NotFound。
    pub async fn mark_read(
        &self,
        user_id: &PrincipalId,
        id: &NotificationId,
    ) -> Result<NotificationRecord, AppError> {
        let updated = self
            .rows
            .update(
                NOTIFICATIONS_TABLE,
                &Filter::new()
                    .eq("id", id.to_value())
                    .eq("user_id", user_id.to_value()),
                read_patch(),
            )
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound("Notification not found".into()))?;
        NotificationRecord::from_row(updated)
    }

    pub async fn mark_all_read(
        &self,
        user_id: &PrincipalId,
    ) -> Result<Vec<NotificationRecord>, AppError> {
        let updated = self
            .rows
            .update(
                NOTIFICATIONS_TABLE,
                &Filter::new()
                    .eq("user_id", user_id.to_value())
                    .eq("is_read", false),
                read_patch(),
            )
            .await?;
        debug!(user_id = %user_id, count = updated.len(), "marked notifications read");
        updated.into_iter().map(NotificationRecord::from_row).collect()
    }

    pub async fn create(&self, draft: NotificationDraft) -> Result<NotificationRecord, AppError> {
        let row = self
            .rows
            .insert(NOTIFICATIONS_TABLE, draft.into_row(Utc::now()))
            .await?;
        NotificationRecord::from_row(row)
    }

    /// お知らせを保存し、有効なインストラクター全員に通知する。
    /// 通知の失敗は保存結果に影響しない。戻り値は通知できた人数。
    pub async fn publish_announcement(
        &self,
        instructors: &InstructorService,
        announcement: Row,
    ) -> Result<(Row, usize), AppError> {
        let saved = self.rows.insert(ANNOUNCEMENTS_TABLE, announcement).await?;
        let title = saved
            .get("title")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("New announcement")
            .to_string();

        let recipients = match instructors.active_principals().await {
            Ok(recipients) => recipients,
            Err(err) => {
                warn!(error = %err, "could not load announcement recipients");
                return Ok((saved, 0));
            }
        };
        let drafts = recipients
            .into_iter()
            .map(|user_id| NotificationDraft::new(user_id, KIND_ANNOUNCEMENT, title.clone()))
            .collect();
        let notified = self.create_each(drafts).await;
        info!(notified, "announcement broadcast");
        Ok((saved, notified))
    }

    pub async fn notify_order_placed(&self, admins: &[PrincipalId], order: &OrderPlaced) -> usize {
        let message = format!(
            "New order {} placed for \u{20b9}{:.2}.",
            order.order_number, order.total
        );
        let metadata = json!({
            "order_number": order.order_number,
            "instructor_id": order.instructor_id.as_ref().map(EntityId::to_value),
        });
        let drafts = admins
            .iter()
            .map(|admin| {
                NotificationDraft::new(admin.clone(), KIND_ORDER, message.clone())
                    .with_metadata(metadata.clone())
            })
            .collect();
        self.create_each(drafts).await
    }

    async fn create_each(&self, drafts: Vec<NotificationDraft>) -> usize {
        let mut created = 0;
        for draft in drafts {
            let user_id = draft.user_id.clone();
            match self.create(draft).await {
                Ok(_) => created += 1,
                Err(err) => warn!(user_id = %user_id, error = %err, "notification insert failed"),
            }
        }
        created
    }
}

fn read_patch() -> Row {
    let mut patch = Row::new();
    patch.insert("is_read".into(), Value::Bool(true));
    patch
}
