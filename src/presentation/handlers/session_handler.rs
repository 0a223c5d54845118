use super::{invalid_input, validate_input};
use crate::application::services::AuthService;
use crate::domain::entities::RoleClaims;
use crate::domain::value_objects::BranchId;
use crate::presentation::dto::session_dto::{
    CompleteProfileRequest, ResetPasswordRequest, RestoreSessionRequest, SessionResponse,
    SignInRequest, SignUpRequestDto, SignUpResponse,
};
use crate::shared::error::AppError;
use std::sync::Arc;

pub struct SessionHandler {
    auth_service: Arc<AuthService>,
}

impl SessionHandler {
    pub fn new(auth_service: Arc<AuthService>) -> Self {
        Self { auth_service }
    }

    pub async fn sign_in(&self, request: SignInRequest) -> Result<SessionResponse, AppError> {
        validate_input(&request)?;
        let context = self
            .auth_service
            .sign_in(&request.email, &request.password)
            .await?;
        Ok(context.into())
    }

    pub async fn sign_up(&self, request: SignUpRequestDto) -> Result<SignUpResponse, AppError> {
        validate_input(&request)?;
        let claims = RoleClaims {
            role: request
                .role
                .map(|role| role.trim().to_string())
                .filter(|role| !role.is_empty()),
            branch_id: match request.branch_id.as_deref().map(str::trim) {
                Some(value) if !value.is_empty() => {
                    Some(BranchId::new(value).map_err(invalid_input)?)
                }
                _ => None,
            },
        };
        let context = self
            .auth_service
            .sign_up(&request.email, &request.password, claims)
            .await?;
        Ok(SignUpResponse {
            confirmation_required: context.is_none(),
            session: context.map(Into::into),
        })
    }

    pub async fn sign_out(&self) {
        self.auth_service.sign_out().await;
    }

    pub async fn reset_password(&self, request: ResetPasswordRequest) -> Result<(), AppError> {
        validate_input(&request)?;
        self.auth_service.reset_password(&request.email).await
    }

    pub async fn refresh(&self) -> Result<SessionResponse, AppError> {
        Ok(self.auth_service.refresh().await?.into())
    }

    pub async fn restore(&self, request: RestoreSessionRequest) -> Result<SessionResponse, AppError> {
        validate_input(&request)?;
        Ok(self
            .auth_service
            .restore(request.access_token.trim())
            .await?
            .into())
    }

    pub async fn complete_profile(
        &self,
        request: CompleteProfileRequest,
    ) -> Result<SessionResponse, AppError> {
        let (_, context) = self.auth_service.complete_profile(request.into()).await?;
        Ok(context.into())
    }

    pub fn current_session(&self) -> Option<SessionResponse> {
        self.auth_service.current_context().map(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::row_store::{Filter, RowStore};
    use crate::application::services::{InstructorService, SessionResolver};
    use crate::domain::entities::Feature;
    use crate::infrastructure::gateway::InMemoryBackend;

    fn handler(backend: &Arc<InMemoryBackend>) -> SessionHandler {
        let instructors = Arc::new(InstructorService::new(backend.clone()));
        let resolver = Arc::new(SessionResolver::new(instructors.clone()));
        SessionHandler::new(Arc::new(AuthService::new(
            backend.clone(),
            resolver,
            instructors,
            None,
        )))
    }

    #[tokio::test]
    async fn sign_up_as_instructor_then_complete_profile() {
        let backend = Arc::new(InMemoryBackend::new());
        let handler = handler(&backend);

        let signed_up = handler
            .sign_up(SignUpRequestDto {
                email: "ravi@example.com".into(),
                password: "secret1".into(),
                role: Some("instructor".into()),
                branch_id: Some("4".into()),
            })
            .await
            .unwrap();
        assert!(!signed_up.confirmation_required);
        let session = signed_up.session.unwrap();
        assert!(!session.profile_complete);
        assert!(session.features.is_empty());

        // 支部は管理者が割り当てる
        let mut patch = crate::domain::value_objects::Row::new();
        patch.insert("branch_id".into(), serde_json::json!(4));
        backend
            .update(
                "instructors",
                &Filter::new().eq("auth_id", serde_json::json!(session.principal_id)),
                patch,
            )
            .await
            .unwrap();

        let session = handler
            .complete_profile(CompleteProfileRequest {
                first_name: "Ravi".into(),
                last_name: "Kumar".into(),
                email: None,
                phone: Some("  ".into()),
                belt_level_id: None,
            })
            .await
            .unwrap();
        assert!(session.profile_complete);
        assert_eq!(session.role.as_deref(), Some("instructor"));
        assert!(session.features.contains(&Feature::Shop));
        assert!(!session.features.contains(&Feature::Branches));
    }

    #[tokio::test]
    async fn short_password_is_rejected_before_the_gateway() {
        let backend = Arc::new(InMemoryBackend::new());
        let err = handler(&backend)
            .sign_up(SignUpRequestDto {
                email: "ravi@example.com".into(),
                password: "123".into(),
                role: None,
                branch_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));
        assert_eq!(handler(&backend).current_session().map(|s| s.principal_id), None);
    }
}
