use super::instructor_service::InstructorService;
use super::notification_service::NotificationService;
use crate::application::ports::row_store::{loose_eq, Filter, Query, RowStore};
use crate::domain::entities::notification::KIND_APPROVAL;
use crate::domain::entities::{
    ApprovalDraft, ApprovalRequest, InstructorRecord, NotificationDraft, SessionContext,
};
use crate::domain::value_objects::{
    ApprovalAction, ApprovalStatus, Decision, EntityId, EntityKind, EntitySchema, PrincipalId,
    RequestId, Row,
};
use crate::shared::error::AppError;
use crate::shared::validation::ValidationFailureKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const APPROVAL_REQUESTS_TABLE: &str = "approval_requests";

const NOT_PERMITTED: &str = "Not permitted to modify this record";

#[derive(Debug, Clone, PartialEq)]
pub struct EditSubmission {
    pub entity_type: EntityKind,
    pub entity_id: EntityId,
    pub requester: PrincipalId,
    pub fields: Row,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApprovalListFilter {
    pub status: Option<ApprovalStatus>,
    pub requester_id: Option<EntityId>,
}

#[async_trait]
pub trait ApprovalServiceTrait: Send + Sync {
    async fn submit_edit(&self, submission: EditSubmission) -> Result<ApprovalRequest, AppError>;
    async fn submit_delete(
        &self,
        entity_type: EntityKind,
        entity_id: EntityId,
        requester: &PrincipalId,
    ) -> Result<ApprovalRequest, AppError>;
    async fn decide(
        &self,
        reviewer: &SessionContext,
        request_id: &RequestId,
        decision: Decision,
    ) -> Result<ApprovalRequest, AppError>;
    async fn list_requests(
        &self,
        filter: ApprovalListFilter,
    ) -> Result<Vec<ApprovalRequest>, AppError>;
    async fn pending_count(&self) -> Result<usize, AppError>;
}

/// インストラクターの変更依頼と管理者の承認・却下を扱う。
pub struct ApprovalService {
    rows: Arc<dyn RowStore>,
    instructors: Arc<InstructorService>,
    notifications: Arc<NotificationService>,
}

impl ApprovalService {
    pub fn new(
        rows: Arc<dyn RowStore>,
        instructors: Arc<InstructorService>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            rows,
            instructors,
            notifications,
        }
    }

    async fn requester_record(&self, requester: &PrincipalId) -> Result<InstructorRecord, AppError> {
        self.instructors
            .find_by_principal(requester)
            .await?
            .ok_or_else(|| AppError::NotFound("Instructor record not found".into()))
    }

    /// 依頼者が対象を変更できるか。存在しない生徒と他支部の生徒は同じエラーにする。
    async fn authorize_target(
        &self,
        requester: &InstructorRecord,
        kind: EntityKind,
        entity_id: &EntityId,
    ) -> Result<(), AppError> {
        match kind {
            EntityKind::Instructor => {
                if &requester.id != entity_id {
                    return Err(AppError::Unauthorized(format!(
                        "instructor {} cannot edit instructor {}",
                        requester.id, entity_id
                    )));
                }
                Ok(())
            }
            EntityKind::Student => {
                let schema = EntitySchema::for_kind(kind);
                let student = self
                    .rows
                    .select(
                        schema.table(),
                        &Query::filtered(Filter::new().eq("id", entity_id.to_value())).limit(1),
                    )
                    .await?
                    .pop();
                let Some(student) = student else {
                    return Err(AppError::Unauthorized(NOT_PERMITTED.into()));
                };
                if let Some(branch) = &requester.branch_id {
                    let student_branch = student.get("branch_id").unwrap_or(&Value::Null);
                    if !loose_eq(student_branch, &branch.to_value()) {
                        return Err(AppError::Unauthorized(NOT_PERMITTED.into()));
                    }
                }
                Ok(())
            }
        }
    }

    async fn insert_request(&self, draft: ApprovalDraft) -> Result<ApprovalRequest, AppError> {
        let row = self
            .rows
            .insert(APPROVAL_REQUESTS_TABLE, draft.into_row(Utc::now()))
            .await?;
        ApprovalRequest::from_row(row)
    }

    async fn fetch_request(&self, request_id: &RequestId) -> Result<ApprovalRequest, AppError> {
        let row = self
            .rows
            .select(
                APPROVAL_REQUESTS_TABLE,
                &Query::filtered(Filter::new().eq("id", request_id.to_value())).limit(1),
            )
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound("Request not found".into()))?;
        ApprovalRequest::from_row(row)
    }

    /// pending のときだけ状態を書き換える。0 行なら他の審査が先に確定している。
    async fn claim(
        &self,
        request: &ApprovalRequest,
        status: ApprovalStatus,
        reviewed_at: DateTime<Utc>,
    ) -> Result<ApprovalRequest, AppError> {
        let filter = Filter::new()
            .eq("id", request.id.to_value())
            .eq("status", ApprovalStatus::Pending.as_str());
        let mut patch = Row::new();
        patch.insert("status".into(), Value::String(status.as_str().into()));
        patch.insert(
            "reviewed_at".into(),
            Value::String(reviewed_at.to_rfc3339()),
        );

        let row = self
            .rows
            .update(APPROVAL_REQUESTS_TABLE, &filter, patch)
            .await?
            .pop()
            .ok_or_else(AppError::already_reviewed)?;
        ApprovalRequest::from_row(row)
    }

    async fn release_claim(&self, claimed: &ApprovalRequest) -> Result<(), AppError> {
        let filter = Filter::new()
            .eq("id", claimed.id.to_value())
            .eq("status", claimed.status.as_str());
        let mut patch = Row::new();
        patch.insert(
            "status".into(),
            Value::String(ApprovalStatus::Pending.as_str().into()),
        );
        patch.insert("reviewed_at".into(), Value::Null);
        self.rows
            .update(APPROVAL_REQUESTS_TABLE, &filter, patch)
            .await?;
        Ok(())
    }

    async fn apply_mutation(
        &self,
        request: &ApprovalRequest,
        projected: Option<Row>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let schema = EntitySchema::for_kind(request.entity_type);
        let target = Filter::new().eq("id", request.entity_id.to_value());
        match (request.action, projected) {
            (ApprovalAction::Update, Some(mut patch)) => {
                patch.insert("updated_at".into(), Value::String(now.to_rfc3339()));
                let updated = self.rows.update(schema.table(), &target, patch).await?;
                if updated.is_empty() {
                    return Err(AppError::NotFound(format!(
                        "{} {} no longer exists",
                        request.entity_type, request.entity_id
                    )));
                }
                Ok(())
            }
            (ApprovalAction::Update, None) => Err(AppError::validation(
                ValidationFailureKind::InvalidPayload,
                "Update request has no payload",
            )),
            (ApprovalAction::Delete, _) => {
                let removed = self.rows.delete(schema.table(), &target).await?;
                if removed.is_empty() {
                    debug!(
                        entity = %request.entity_id,
                        "delete target already absent"
                    );
                }
                Ok(())
            }
        }
    }

    async fn notify_requester(&self, request: &ApprovalRequest) {
        let instructor = match self.instructors.find_by_id(&request.requester_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(request = %request.id, "requester record missing, notification skipped");
                return;
            }
            Err(err) => {
                warn!(request = %request.id, error = %err, "requester lookup failed");
                return;
            }
        };
        let Some(auth_id) = instructor.auth_id else {
            debug!(request = %request.id, "requester has no linked principal");
            return;
        };

        let message = format!(
            "Your {} {} request was {}.",
            request.entity_type.notification_label(),
            request.action,
            request.status
        );
        let draft = NotificationDraft::new(auth_id, KIND_APPROVAL, message);
        if let Err(err) = self.notifications.create(draft).await {
            warn!(request = %request.id, error = %err, "approval notification failed");
        }
    }
}

#[async_trait]
impl ApprovalServiceTrait for ApprovalService {
    async fn submit_edit(&self, submission: EditSubmission) -> Result<ApprovalRequest, AppError> {
        let schema = EntitySchema::for_kind(submission.entity_type);
        let projected = schema.project_and_validate(&submission.fields)?;

        let requester = self.requester_record(&submission.requester).await?;
        self.authorize_target(&requester, submission.entity_type, &submission.entity_id)
            .await?;

        let request = self
            .insert_request(ApprovalDraft::update(
                submission.entity_type,
                submission.entity_id,
                requester.id,
                projected,
            ))
            .await?;
        info!(
            request = %request.id,
            entity_type = %request.entity_type,
            entity = %request.entity_id,
            "edit request submitted"
        );
        Ok(request)
    }

    async fn submit_delete(
        &self,
        entity_type: EntityKind,
        entity_id: EntityId,
        requester: &PrincipalId,
    ) -> Result<ApprovalRequest, AppError> {
        if entity_type == EntityKind::Instructor {
            return Err(AppError::validation(
                ValidationFailureKind::UnsupportedAction,
                "Instructor records cannot be deleted by request",
            ));
        }
        let requester = self.requester_record(requester).await?;
        self.authorize_target(&requester, entity_type, &entity_id)
            .await?;

        let request = self
            .insert_request(ApprovalDraft::delete(entity_type, entity_id, requester.id))
            .await?;
        info!(
            request = %request.id,
            entity = %request.entity_id,
            "delete request submitted"
        );
        Ok(request)
    }

    async fn decide(
        &self,
        reviewer: &SessionContext,
        request_id: &RequestId,
        decision: Decision,
    ) -> Result<ApprovalRequest, AppError> {
        if !reviewer.is_admin() {
            return Err(AppError::Unauthorized(format!(
                "{} is not an admin",
                reviewer.principal_id
            )));
        }

        let request = self.fetch_request(request_id).await?;
        request.ensure_pending()?;

        // 承認時点のスキーマで再射影する
        let projected = match (decision, request.action, &request.payload) {
            (Decision::Approve, ApprovalAction::Update, Some(payload)) => Some(
                EntitySchema::for_kind(request.entity_type).project_and_validate(payload)?,
            ),
            _ => None,
        };

        let now = Utc::now();
        let claimed = self
            .claim(&request, decision.resulting_status(), now)
            .await?;

        if decision == Decision::Approve {
            if let Err(err) = self.apply_mutation(&claimed, projected, now).await {
                if let Err(revert_err) = self.release_claim(&claimed).await {
                    error!(
                        request = %claimed.id,
                        error = %revert_err,
                        "failed to revert approval after mutation failure"
                    );
                }
                warn!(request = %claimed.id, error = %err, "approval mutation failed");
                return Err(err);
            }
        }

        info!(
            request = %claimed.id,
            status = %claimed.status,
            "approval request decided"
        );
        self.notify_requester(&claimed).await;
        Ok(claimed)
    }

    async fn list_requests(
        &self,
        filter: ApprovalListFilter,
    ) -> Result<Vec<ApprovalRequest>, AppError> {
        let mut row_filter = Filter::new();
        if let Some(status) = filter.status {
            row_filter = row_filter.eq("status", status.as_str());
        }
        if let Some(requester) = &filter.requester_id {
            row_filter = row_filter.eq("instructor_id", requester.to_value());
        }
        let rows = self
            .rows
            .select(
                APPROVAL_REQUESTS_TABLE,
                &Query::filtered(row_filter).order_by("created_at", false),
            )
            .await?;
        rows.into_iter().map(ApprovalRequest::from_row).collect()
    }

    async fn pending_count(&self) -> Result<usize, AppError> {
        let rows = self
            .rows
            .select(
                APPROVAL_REQUESTS_TABLE,
                &Query::filtered(Filter::new().eq("status", ApprovalStatus::Pending.as_str())),
            )
            .await?;
        Ok(rows.len())
    }
}
