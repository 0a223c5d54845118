use super::Validate;
use crate::domain::entities::{Feature, ProfileInput, SessionContext};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

impl Validate for SignInRequest {
    fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() {
            return Err("Email is required".to_string());
        }
        if self.password.is_empty() {
            return Err("Password is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequestDto {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl Validate for SignUpRequestDto {
    fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() {
            return Err("Email is required".to_string());
        }
        if self.password.len() < 6 {
            return Err("Password must be at least 6 characters".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
}

impl Validate for ResetPasswordRequest {
    fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() {
            return Err("Email is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSessionRequest {
    pub access_token: String,
}

impl Validate for RestoreSessionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.access_token.trim().is_empty() {
            return Err("Access token is required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteProfileRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub belt_level_id: Option<i64>,
}

impl From<CompleteProfileRequest> for ProfileInput {
    fn from(request: CompleteProfileRequest) -> Self {
        Self {
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            phone: request.phone,
            belt_level_id: request.belt_level_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub principal_id: String,
    pub role: Option<String>,
    pub branch_id: Option<String>,
    pub instructor_id: Option<String>,
    pub profile_complete: bool,
    pub features: Vec<Feature>,
}

impl From<SessionContext> for SessionResponse {
    fn from(context: SessionContext) -> Self {
        let features = context.accessible_features();
        Self {
            principal_id: context.principal_id.to_string(),
            role: context.role.map(|role| role.to_string()),
            branch_id: context.branch_id.map(|id| id.to_string()),
            instructor_id: context.instructor_id.map(|id| id.to_string()),
            profile_complete: context.profile_complete,
            features,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpResponse {
    /// メール確認待ちなら None
    pub session: Option<SessionResponse>,
    pub confirmation_required: bool,
}
