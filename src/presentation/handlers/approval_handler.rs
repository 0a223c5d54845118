use super::{invalid_input, no_session, validate_input};
use crate::application::services::approval_service::{
    ApprovalListFilter, ApprovalServiceTrait, EditSubmission,
};
use crate::application::services::AuthService;
use crate::domain::value_objects::{ApprovalStatus, Decision, EntityId, EntityKind, RequestId};
use crate::presentation::dto::approval_dto::{
    ApprovalRequestResponse, DecideRequest, ListApprovalRequestsRequest, PendingCountResponse,
    SubmitDeleteRequest, SubmitEditRequest,
};
use crate::shared::error::AppError;
use std::sync::Arc;

pub struct ApprovalHandler {
    approval_service: Arc<dyn ApprovalServiceTrait>,
    auth_service: Arc<AuthService>,
}

impl ApprovalHandler {
    pub fn new(
        approval_service: Arc<dyn ApprovalServiceTrait>,
        auth_service: Arc<AuthService>,
    ) -> Self {
        Self {
            approval_service,
            auth_service,
        }
    }

    pub async fn submit_edit(
        &self,
        request: SubmitEditRequest,
    ) -> Result<ApprovalRequestResponse, AppError> {
        validate_input(&request)?;
        let principal = self
            .auth_service
            .current_principal()
            .await
            .ok_or_else(no_session)?;

        let submission = EditSubmission {
            entity_type: parse_kind(&request.entity_type)?,
            entity_id: parse_entity_id(&request.entity_id)?,
            requester: principal.id,
            fields: request.fields,
        };
        let created = self.approval_service.submit_edit(submission).await?;
        Ok(created.into())
    }

    pub async fn submit_delete(
        &self,
        request: SubmitDeleteRequest,
    ) -> Result<ApprovalRequestResponse, AppError> {
        validate_input(&request)?;
        let principal = self
            .auth_service
            .current_principal()
            .await
            .ok_or_else(no_session)?;

        let created = self
            .approval_service
            .submit_delete(
                parse_kind(&request.entity_type)?,
                parse_entity_id(&request.entity_id)?,
                &principal.id,
            )
            .await?;
        Ok(created.into())
    }

    pub async fn decide(&self, request: DecideRequest) -> Result<ApprovalRequestResponse, AppError> {
        validate_input(&request)?;
        let reviewer = self.auth_service.current_context().ok_or_else(no_session)?;
        let request_id = RequestId::new(request.request_id.trim()).map_err(invalid_input)?;
        let decision = Decision::from_str(&request.decision)
            .ok_or_else(|| invalid_input(format!("Unknown decision: {}", request.decision)))?;

        let decided = self
            .approval_service
            .decide(&reviewer, &request_id, decision)
            .await?;
        Ok(decided.into())
    }

    pub async fn list_requests(
        &self,
        request: ListApprovalRequestsRequest,
    ) -> Result<Vec<ApprovalRequestResponse>, AppError> {
        validate_input(&request)?;
        let filter = ApprovalListFilter {
            status: match request.status.as_deref() {
                Some(value) => Some(parse_status(value)?),
                None => None,
            },
            requester_id: match request.requester_id.as_deref() {
                Some(value) => Some(parse_entity_id(value)?),
                None => None,
            },
        };
        let requests = self.approval_service.list_requests(filter).await?;
        Ok(requests.into_iter().map(Into::into).collect())
    }

    pub async fn pending_count(&self) -> Result<PendingCountResponse, AppError> {
        let count = self.approval_service.pending_count().await?;
        Ok(PendingCountResponse { count })
    }
}

fn parse_status(value: &str) -> Result<ApprovalStatus, AppError> {
    ApprovalStatus::from_str(value).ok_or_else(|| invalid_input(format!("Unknown status: {value}")))
}

fn parse_kind(value: &str) -> Result<EntityKind, AppError> {
    EntityKind::from_str(value).ok_or_else(|| invalid_input(format!("Unknown entity type: {value}")))
}

fn parse_entity_id(value: &str) -> Result<EntityId, AppError> {
    EntityId::new(value.trim()).map_err(invalid_input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ApprovalRequest, SessionContext};
    use crate::domain::value_objects::PrincipalId;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub Approvals {}

        #[async_trait]
        impl ApprovalServiceTrait for Approvals {
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
    }

    fn signed_out_auth() -> Arc<AuthService> {
        use crate::application::services::{InstructorService, SessionResolver};
        use crate::infrastructure::gateway::InMemoryBackend;

        let backend = Arc::new(InMemoryBackend::new());
        let instructors = Arc::new(InstructorService::new(backend.clone()));
        let resolver = Arc::new(SessionResolver::new(instructors.clone()));
        Arc::new(AuthService::new(backend, resolver, instructors, None))
    }

    #[tokio::test]
    async fn submissions_require_a_session() {
        let mut approvals = MockApprovals::new();
        approvals.expect_submit_edit().times(0);
        let handler = ApprovalHandler::new(Arc::new(approvals), signed_out_auth());

        let err = handler
            .submit_edit(SubmitEditRequest {
                entity_type: "student".into(),
                entity_id: "42".into(),
                fields: Default::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn malformed_input_never_reaches_the_service() {
        let mut approvals = MockApprovals::new();
        approvals.expect_decide().times(0);
        let handler = ApprovalHandler::new(Arc::new(approvals), signed_out_auth());

        let err = handler
            .decide(DecideRequest {
                request_id: "7".into(),
                decision: "later".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn list_parses_filters() {
        let mut approvals = MockApprovals::new();
        approvals
            .expect_list_requests()
            .withf(|filter| {
                filter.status == Some(ApprovalStatus::Pending)
                    && filter.requester_id.as_ref().map(|id| id.as_str()) == Some("5")
            })
            .times(1)
            .returning(|_| Ok(Vec::new()));
        let handler = ApprovalHandler::new(Arc::new(approvals), signed_out_auth());

        let listed = handler
            .list_requests(ListApprovalRequestsRequest {
                status: Some("pending".into()),
                requester_id: Some("5".into()),
            })
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn unknown_status_filter_is_rejected() {
        let mut approvals = MockApprovals::new();
        approvals.expect_list_requests().times(0);
        let handler = ApprovalHandler::new(Arc::new(approvals), signed_out_auth());

        let err = handler
            .list_requests(ListApprovalRequestsRequest {
                status: Some("bogus".into()),
                requester_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));
    }
}
