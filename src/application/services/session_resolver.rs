use super::instructor_service::InstructorService;
use crate::domain::entities::{Principal, Role, SessionContext};
use crate::shared::error::AppError;
use std::sync::Arc;
use tracing::debug;

/// 認証主体からロール・支部スコープ・プロフィール完了状態を導く。
pub struct SessionResolver {
    instructors: Arc<InstructorService>,
}

impl SessionResolver {
    pub fn new(instructors: Arc<InstructorService>) -> Self {
        Self { instructors }
    }

    pub async fn resolve(&self, principal: &Principal) -> Result<SessionContext, AppError> {
        let claim = principal.claim_role().map(Role::from_claim);
        let claim_branch = principal.claims.branch_id.clone();

        // 管理者クレームはレコード参照より優先
        if claim == Some(Role::Admin) {
            debug!(principal = %principal.id, "resolved admin session");
            return Ok(SessionContext {
                principal_id: principal.id.clone(),
                role: Some(Role::Admin),
                branch_id: claim_branch,
                instructor_id: None,
                profile_complete: true,
            });
        }

        if let Some(record) = self.instructors.find_by_principal(&principal.id).await? {
            let profile_complete = record.is_profile_complete();
            debug!(
                principal = %principal.id,
                instructor = %record.id,
                profile_complete,
                "resolved instructor session"
            );
            return Ok(SessionContext {
                principal_id: principal.id.clone(),
                role: Some(Role::Instructor),
                branch_id: record.branch_id.or(claim_branch),
                instructor_id: Some(record.id),
                profile_complete,
            });
        }

        if claim == Some(Role::Instructor) {
            debug!(principal = %principal.id, "instructor claim without record");
            return Ok(SessionContext {
                principal_id: principal.id.clone(),
                role: Some(Role::Instructor),
                branch_id: claim_branch,
                instructor_id: None,
                profile_complete: false,
            });
        }

        Ok(SessionContext {
            principal_id: principal.id.clone(),
            role: claim,
            branch_id: None,
            instructor_id: None,
            profile_complete: true,
        })
    }
}
