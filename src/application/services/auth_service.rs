use super::instructor_service::InstructorService;
use super::notification_reconciler::NotificationReconciler;
use super::session_resolver::SessionResolver;
use crate::application::ports::auth_gateway::{AuthGateway, AuthSession, SignUpRequest};
use crate::domain::entities::{InstructorRecord, Principal, ProfileInput, RoleClaims, SessionContext};
use crate::domain::value_objects::PrincipalId;
use crate::shared::error::AppError;
use crate::shared::validation::ValidationFailureKind;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

/// 認証状態の遷移をまとめ、変わるたびに SessionContext を配信する。
pub struct AuthService {
    auth: Arc<dyn AuthGateway>,
    resolver: Arc<SessionResolver>,
    instructors: Arc<InstructorService>,
    reconciler: Option<Arc<NotificationReconciler>>,
    session: RwLock<Option<AuthSession>>,
    context_tx: watch::Sender<Option<SessionContext>>,
    // 通知キャッシュを最後に消した時点のユーザー
    cleared_for: Mutex<Option<PrincipalId>>,
}

impl AuthService {
    pub fn new(
        auth: Arc<dyn AuthGateway>,
        resolver: Arc<SessionResolver>,
        instructors: Arc<InstructorService>,
        reconciler: Option<Arc<NotificationReconciler>>,
    ) -> Self {
        let (context_tx, _) = watch::channel(None);
        Self {
            auth,
            resolver,
            instructors,
            reconciler,
            session: RwLock::new(None),
            context_tx,
            cleared_for: Mutex::new(None),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionContext, AppError> {
        let email = require_email(email)?;
        if password.is_empty() {
            return Err(AppError::required_field("password"));
        }
        let session = self.auth.sign_in(&email, password).await?;
        self.provision(&session.principal).await;
        self.establish(session).await
    }

    /// メール確認待ちの構成では None。
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        claims: RoleClaims,
    ) -> Result<Option<SessionContext>, AppError> {
        let email = require_email(email)?;
        if password.is_empty() {
            return Err(AppError::required_field("password"));
        }
        let request = SignUpRequest {
            email,
            password: password.to_string(),
            claims,
        };
        match self.auth.sign_up(request).await? {
            Some(session) => {
                self.provision(&session.principal).await;
                self.establish(session).await.map(Some)
            }
            None => {
                debug!("sign-up awaiting email confirmation");
                Ok(None)
            }
        }
    }

    /// サーバー側の失敗に関わらずローカルの状態は必ず消す。
    pub async fn sign_out(&self) {
        let previous = self.session.write().await.take();
        if let Some(session) = previous {
            if let Err(err) = self.auth.sign_out(&session.access_token).await {
                warn!(error = %err, "remote sign-out failed");
            }
            info!(principal = %session.principal.id, "signed out");
        }
        self.switch_principal(None).await;
        self.context_tx.send_replace(None);
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AppError> {
        let email = require_email(email)?;
        self.auth.reset_password(&email).await
    }

    pub async fn refresh(&self) -> Result<SessionContext, AppError> {
        let refresh_token = self
            .session
            .read()
            .await
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
            .ok_or_else(|| AppError::Unauthorized("No active session".into()))?;
        let session = self.auth.refresh_session(&refresh_token).await?;
        self.establish(session).await
    }

    /// 保存済みのアクセストークンからセッションを復元する。
    pub async fn restore(&self, access_token: &str) -> Result<SessionContext, AppError> {
        let principal = self.auth.get_user(access_token).await?;
        let session = AuthSession {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: None,
            principal,
        };
        self.establish(session).await
    }

    pub async fn complete_profile(
        &self,
        input: ProfileInput,
    ) -> Result<(InstructorRecord, SessionContext), AppError> {
        let principal = self
            .current_principal()
            .await
            .ok_or_else(|| AppError::Unauthorized("No active session".into()))?;
        let record = self.instructors.complete_profile(&principal, input).await?;
        let context = self.resolver.resolve(&principal).await?;
        self.context_tx.send_replace(Some(context.clone()));
        Ok((record, context))
    }

    pub fn current_context(&self) -> Option<SessionContext> {
        self.context_tx.borrow().clone()
    }

    pub fn subscribe_context(&self) -> watch::Receiver<Option<SessionContext>> {
        self.context_tx.subscribe()
    }

    pub async fn current_principal(&self) -> Option<Principal> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.principal.clone())
    }

    pub async fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    async fn provision(&self, principal: &Principal) {
        if let Err(err) = self.instructors.ensure_for_auth(principal).await {
            warn!(principal = %principal.id, error = %err, "instructor provisioning failed");
        }
    }

    async fn establish(&self, session: AuthSession) -> Result<SessionContext, AppError> {
        let context = self.resolver.resolve(&session.principal).await?;
        self.switch_principal(Some(&session.principal.id)).await;
        debug!(
            principal = %session.principal.id,
            role = ?context.role,
            profile_complete = context.profile_complete,
            "session established"
        );
        *self.session.write().await = Some(session);
        self.context_tx.send_replace(Some(context.clone()));
        Ok(context)
    }

    /// 主体が変わったときだけ通知キャッシュを消す。トークン更新では消さない。
    async fn switch_principal(&self, next: Option<&PrincipalId>) {
        let mut cleared_for = self.cleared_for.lock().await;
        if cleared_for.as_ref() == next {
            return;
        }
        if let Some(reconciler) = &self.reconciler {
            reconciler.clear_cache().await;
            debug!("notification cache cleared for principal change");
        }
        *cleared_for = next.cloned();
    }
}

fn require_email(email: &str) -> Result<String, AppError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AppError::required_field("email"));
    }
    if !email.contains('@') {
        return Err(AppError::ValidationError {
            kind: ValidationFailureKind::InvalidPayload,
            field: Some("email".into()),
            message: "Email is invalid".into(),
        });
    }
    Ok(email.to_string())
}
