use crate::domain::entities::{Principal, RoleClaims};
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub principal: Principal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub claims: RoleClaims,
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AppError>;
    /// メール確認が必要な構成ではセッションが返らない。
    async fn sign_up(&self, request: SignUpRequest) -> Result<Option<AuthSession>, AppError>;
    async fn sign_out(&self, access_token: &str) -> Result<(), AppError>;
    async fn reset_password(&self, email: &str) -> Result<(), AppError>;
    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, AppError>;
    async fn get_user(&self, access_token: &str) -> Result<Principal, AppError>;
}
