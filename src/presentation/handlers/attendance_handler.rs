use super::{invalid_input, no_session, validate_input};
use crate::application::services::{AuthService, OfflineQueueService};
use crate::domain::entities::{AttendanceMark, AttendanceStatus};
use crate::domain::value_objects::EntityId;
use crate::presentation::dto::attendance_dto::{
    DrainOfflineQueueResponse, RecordAttendanceRequest, RecordAttendanceResponse,
    SyncStatusResponse, CLASS_DATE_FORMAT,
};
use crate::shared::error::AppError;
use chrono::NaiveDate;
use std::sync::Arc;

pub struct AttendanceHandler {
    offline_service: Arc<OfflineQueueService>,
    auth_service: Arc<AuthService>,
}

impl AttendanceHandler {
    pub fn new(offline_service: Arc<OfflineQueueService>, auth_service: Arc<AuthService>) -> Self {
        Self {
            offline_service,
            auth_service,
        }
    }

    pub async fn record_attendance(
        &self,
        request: RecordAttendanceRequest,
    ) -> Result<RecordAttendanceResponse, AppError> {
        validate_input(&request)?;
        let principal = self
            .auth_service
            .current_principal()
            .await
            .ok_or_else(no_session)?;

        let student_id = EntityId::new(request.student_id.trim()).map_err(invalid_input)?;
        let class_date = NaiveDate::parse_from_str(&request.class_date, CLASS_DATE_FORMAT)
            .map_err(|err| invalid_input(err.to_string()))?;
        let status = AttendanceStatus::from_str(&request.status)
            .ok_or_else(|| invalid_input(format!("Unknown attendance status: {}", request.status)))?;

        let mut mark = AttendanceMark::new(student_id, class_date, status).marked_by(principal.id);
        mark.notes = request
            .notes
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty());

        let outcome = self.offline_service.record_attendance(mark).await?;
        Ok(outcome.into())
    }

    pub async fn drain_offline_queue(&self) -> Result<DrainOfflineQueueResponse, AppError> {
        let report = self.offline_service.drain().await?;
        Ok(report.into())
    }

    pub async fn sync_status(&self) -> SyncStatusResponse {
        self.offline_service.sync_indicator().await.into()
    }
}
