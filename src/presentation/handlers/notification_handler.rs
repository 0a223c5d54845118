use super::{invalid_input, no_session, validate_input};
use crate::application::services::notification_service::OrderPlaced;
use crate::application::services::{
    AuthService, InstructorService, NotificationListener, NotificationReconciler,
    NotificationService, NotificationSubscription,
};
use crate::domain::entities::{Feature, NotificationView};
use crate::domain::value_objects::{NotificationId, PrincipalId, Row};
use crate::presentation::dto::notification_dto::{
    ListNotificationsRequest, MarkAllReadResponse, MarkNotificationReadRequest,
    NotificationResponse, OrderPlacedRequest, PublishAnnouncementRequest,
    PublishAnnouncementResponse, UnreadCountResponse,
};
use crate::shared::error::AppError;
use serde_json::Value;
use std::sync::Arc;

pub struct NotificationHandler {
    reconciler: Arc<NotificationReconciler>,
    notification_service: Arc<NotificationService>,
    instructor_service: Arc<InstructorService>,
    auth_service: Arc<AuthService>,
}

impl NotificationHandler {
    pub fn new(
        reconciler: Arc<NotificationReconciler>,
        notification_service: Arc<NotificationService>,
        instructor_service: Arc<InstructorService>,
        auth_service: Arc<AuthService>,
    ) -> Self {
        Self {
            reconciler,
            notification_service,
            instructor_service,
            auth_service,
        }
    }

    pub async fn list(
        &self,
        request: ListNotificationsRequest,
    ) -> Result<Vec<NotificationResponse>, AppError> {
        let user_id = self.current_user().await?;
        let view = if request.unread_only {
            NotificationView::UnreadOnly
        } else {
            NotificationView::All
        };
        let records = self.reconciler.refresh(&user_id, view).await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    /// 読み込み済みのキャッシュがあればそこから数える。
    pub async fn unread_count(&self) -> Result<UnreadCountResponse, AppError> {
        let user_id = self.current_user().await?;
        let count = match self.reconciler.cache().unread_count(&user_id).await {
            Some(count) => count,
            None => self.notification_service.unread_count(&user_id).await?,
        };
        Ok(UnreadCountResponse { count })
    }

    pub async fn mark_read(
        &self,
        request: MarkNotificationReadRequest,
    ) -> Result<NotificationResponse, AppError> {
        validate_input(&request)?;
        let user_id = self.current_user().await?;
        let id = NotificationId::new(request.notification_id.trim()).map_err(invalid_input)?;
        let record = self.reconciler.mark_read(&user_id, &id).await?;
        Ok(record.into())
    }

    pub async fn mark_all_read(&self) -> Result<MarkAllReadResponse, AppError> {
        let user_id = self.current_user().await?;
        let updated = self.reconciler.mark_all_read(&user_id).await?;
        Ok(MarkAllReadResponse { updated })
    }

    pub async fn subscribe(
        &self,
        listener: Arc<dyn NotificationListener>,
    ) -> Result<NotificationSubscription, AppError> {
        let user_id = self.current_user().await?;
        Ok(self.reconciler.subscribe(user_id, listener))
    }

    /// 管理者のみ。保存できれば通知の成否に関わらず成功扱い。
    pub async fn publish_announcement(
        &self,
        request: PublishAnnouncementRequest,
    ) -> Result<PublishAnnouncementResponse, AppError> {
        validate_input(&request)?;
        let context = self.auth_service.current_context().ok_or_else(no_session)?;
        if !context.can_access(Feature::Announcements) {
            return Err(AppError::Unauthorized(
                "Only admins can publish announcements".into(),
            ));
        }

        let mut announcement = Row::new();
        announcement.insert("title".into(), Value::String(request.title.trim().to_string()));
        announcement.insert(
            "content".into(),
            request.content.map(Value::String).unwrap_or(Value::Null),
        );
        announcement.insert(
            "branch_id".into(),
            request
                .branch_id
                .map(|id| Value::String(id.trim().to_string()))
                .unwrap_or(Value::Null),
        );
        announcement.insert("created_by".into(), context.principal_id.to_value());

        let (saved, notified) = self
            .notification_service
            .publish_announcement(&self.instructor_service, announcement)
            .await?;
        Ok(PublishAnnouncementResponse {
            announcement: Value::Object(saved),
            notified,
        })
    }

    /// 注文の確定を管理者へ知らせる。戻り値は通知できた件数。
    pub async fn notify_order_placed(&self, request: OrderPlacedRequest) -> Result<usize, AppError> {
        validate_input(&request)?;
        let context = self.auth_service.current_context().ok_or_else(no_session)?;
        let admins = request
            .admin_ids
            .iter()
            .map(|id| PrincipalId::new(id.trim()).map_err(invalid_input))
            .collect::<Result<Vec<_>, _>>()?;
        let order = OrderPlaced {
            order_number: request.order_number.trim().to_string(),
            total: request.total,
            instructor_id: context.instructor_id,
        };
        Ok(self
            .notification_service
            .notify_order_placed(&admins, &order)
            .await)
    }

    async fn current_user(&self) -> Result<PrincipalId, AppError> {
        self.auth_service
            .current_principal()
            .await
            .map(|principal| principal.id)
            .ok_or_else(no_session)
    }
}
