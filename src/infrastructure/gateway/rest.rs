use super::token::AccessTokenSlot;
use crate::application::ports::auth_gateway::{AuthGateway, AuthSession, SignUpRequest};
use crate::application::ports::object_storage::ObjectStorage;
use crate::application::ports::row_store::{Filter, FilterOp, Query, RowStore};
use crate::domain::entities::{Principal, RoleClaims};
use crate::domain::value_objects::{PrincipalId, Row};
use crate::shared::config::BackendConfig;
use crate::shared::error::AppError;
use crate::shared::validation::ValidationFailureKind;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const PREFER_REPRESENTATION: &str = "return=representation";
const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=representation";

/// PostgREST / GoTrue 互換のホスト型バックエンドに HTTP で話すクライアント。
pub struct RestBackend {
    client: Client,
    base_url: Url,
    anon_key: String,
    token: AccessTokenSlot,
}

impl RestBackend {
    pub fn new(config: &BackendConfig, token: AccessTokenSlot) -> Result<Self, AppError> {
        let base_url = Url::parse(&config.url)
            .map_err(|err| AppError::ConfigurationError(format!("invalid backend url: {err}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| AppError::ConfigurationError(err.to_string()))?;
        Ok(Self {
            client,
            base_url,
            anon_key: config.anon_key.clone(),
            token,
        })
    }

    pub fn token(&self) -> &AccessTokenSlot {
        &self.token
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|err| AppError::ConfigurationError(format!("invalid endpoint {path}: {err}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = self.token.get().unwrap_or_else(|| self.anon_key.clone());
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    fn table_request(
        &self,
        method: Method,
        table: &str,
        params: Vec<(String, String)>,
    ) -> Result<RequestBuilder, AppError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(self.request(method, url))
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> Result<String, AppError> {
        Ok(self
            .endpoint(&format!("storage/v1/object/public/{bucket}/{path}"))?
            .to_string())
    }
}

/// フィルタを `column=op.value` 形式のクエリに落とす。
pub(crate) fn filter_params(filter: &Filter) -> Vec<(String, String)> {
    filter
        .conditions()
        .iter()
        .map(|cond| {
            let value = match cond.op {
                FilterOp::Eq => format!("eq.{}", scalar(&cond.value)),
                FilterOp::Neq => format!("neq.{}", scalar(&cond.value)),
                FilterOp::IsNull => "is.null".to_string(),
            };
            (cond.column.clone(), value)
        })
        .collect()
}

pub(crate) fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filter));
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".into(), format!("{}.{direction}", order.column)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".into(), limit.to_string()));
    }
    params
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".into(),
        other => other.to_string(),
    }
}

/// HTTP ステータスをエラー分類に写す。
pub(crate) fn status_error(status: StatusCode, body: &str) -> AppError {
    let message = error_message(body).unwrap_or_else(|| format!("backend error ({status})"));
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::validation(ValidationFailureKind::InvalidPayload, message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized(message),
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::CONFLICT => AppError::Conflict(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            AppError::TransientNetwork(message)
        }
        s if s.is_server_error() => AppError::TransientNetwork(message),
        _ => AppError::Internal(message),
    }
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, AppError> {
    let body = send_text(builder).await?;
    serde_json::from_str(&body).map_err(|err| AppError::DeserializationError(err.to_string()))
}

async fn send_text(builder: RequestBuilder) -> Result<String, AppError> {
    let response = builder.send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        debug!(%status, "backend request failed");
        return Err(status_error(status, &body));
    }
    Ok(body)
}

fn first_row(rows: Vec<Row>) -> Result<Row, AppError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| AppError::DeserializationError("empty representation".into()))
}

#[async_trait]
impl RowStore for RestBackend {
    async fn insert(&self, table: &str, row: Row) -> Result<Row, AppError> {
        let builder = self
            .table_request(Method::POST, table, Vec::new())?
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&row);
        first_row(send_json(builder).await?)
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, AppError> {
        let params = vec![("on_conflict".to_string(), on_conflict.to_string())];
        let builder = self
            .table_request(Method::POST, table, params)?
            .header("Prefer", PREFER_UPSERT)
            .json(&row);
        first_row(send_json(builder).await?)
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Row,
    ) -> Result<Vec<Row>, AppError> {
        if filter.is_empty() {
            return Err(AppError::Internal("refusing unfiltered update".into()));
        }
        let builder = self
            .table_request(Method::PATCH, table, filter_params(filter))?
            .header("Prefer", PREFER_REPRESENTATION)
            .json(&patch);
        send_json(builder).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, AppError> {
        if filter.is_empty() {
            return Err(AppError::Internal("refusing unfiltered delete".into()));
        }
        let builder = self
            .table_request(Method::DELETE, table, filter_params(filter))?
            .header("Prefer", PREFER_REPRESENTATION);
        send_json(builder).await
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, AppError> {
        let builder = self.table_request(Method::GET, table, query_params(query))?;
        send_json(builder).await
    }
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: PrincipalId,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: RoleClaims,
}

impl From<UserPayload> for Principal {
    fn from(user: UserPayload) -> Self {
        Principal {
            id: user.id,
            email: user.email,
            claims: user.user_metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserPayload,
}

impl From<TokenPayload> for AuthSession {
    fn from(payload: TokenPayload) -> Self {
        AuthSession {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            expires_at: payload.expires_at,
            principal: payload.user.into(),
        }
    }
}

/// signup はメール確認の有無で返り値の形が変わる。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpPayload {
    Session(TokenPayload),
    User(Box<UserPayload>),
}

impl RestBackend {
    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<AuthSession, AppError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        let payload: TokenPayload = send_json(self.request(Method::POST, url).json(&body)).await?;
        let session: AuthSession = payload.into();
        self.token.set(Some(session.access_token.clone()));
        Ok(session)
    }
}

#[async_trait]
impl AuthGateway for RestBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AppError> {
        self.token_grant("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn sign_up(&self, request: SignUpRequest) -> Result<Option<AuthSession>, AppError> {
        let url = self.endpoint("auth/v1/signup")?;
        let body = json!({
            "email": request.email,
            "password": request.password,
            "data": request.claims,
        });
        match send_json::<SignUpPayload>(self.request(Method::POST, url).json(&body)).await? {
            SignUpPayload::Session(payload) => {
                let session: AuthSession = payload.into();
                self.token.set(Some(session.access_token.clone()));
                Ok(Some(session))
            }
            SignUpPayload::User(_) => Ok(None),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let url = self.endpoint("auth/v1/logout")?;
        let builder = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token);
        let result = send_text(builder).await;
        self.token.set(None);
        result.map(|_| ())
    }

    async fn reset_password(&self, email: &str) -> Result<(), AppError> {
        let url = self.endpoint("auth/v1/recover")?;
        send_text(self.request(Method::POST, url).json(&json!({ "email": email }))).await?;
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, AppError> {
        self.token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn get_user(&self, access_token: &str) -> Result<Principal, AppError> {
        let url = self.endpoint("auth/v1/user")?;
        let builder = self
            .client
            .get(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token);
        let user: UserPayload = send_json(builder).await?;
        self.token.set(Some(access_token.to_string()));
        Ok(user.into())
    }
}

#[async_trait]
impl ObjectStorage for RestBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        let url = self.endpoint(&format!("storage/v1/object/{bucket}/{path}"))?;
        let builder = self
            .request(Method::POST, url)
            .header("x-upsert", "true")
            .header("Content-Type", content_type)
            .body(bytes);
        send_text(builder).await.map_err(|err| match err {
            AppError::TransientNetwork(_) => err,
            other => AppError::Storage(other.to_string()),
        })?;
        self.public_url(bucket, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RestBackend {
        RestBackend::new(
            &BackendConfig {
                url: "https://demo.example.co/".into(),
                anon_key: "anon".into(),
                request_timeout_secs: 5,
            },
            AccessTokenSlot::new(),
        )
        .unwrap()
    }

    #[test]
    fn query_renders_postgrest_params() {
        let query = Query::filtered(
            Filter::new()
                .eq("user_id", "u-1")
                .eq("is_read", false)
                .is_null("deleted_at"),
        )
        .order_by("created_at", false)
        .limit(50);

        let params = query_params(&query);
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("user_id".to_string(), "eq.u-1".to_string()),
                ("is_read".to_string(), "eq.false".to_string()),
                ("deleted_at".to_string(), "is.null".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn statuses_map_onto_error_taxonomy() {
        let body = r#"{"message":"duplicate key"}"#;
        assert!(matches!(
            status_error(StatusCode::CONFLICT, body),
            AppError::Conflict(msg) if msg == "duplicate key"
        ));
        assert!(status_error(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, ""),
            AppError::Unauthorized(_)
        ));
        assert!(status_error(StatusCode::BAD_REQUEST, "{}")
            .validation_kind()
            .is_some());
    }

    #[test]
    fn public_url_points_at_public_bucket() {
        let url = backend().public_url("student-photos", "12-1700000000000.jpg").unwrap();
        assert_eq!(
            url,
            "https://demo.example.co/storage/v1/object/public/student-photos/12-1700000000000.jpg"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = RestBackend::new(
            &BackendConfig {
                url: "not a url".into(),
                ..BackendConfig::default()
            },
            AccessTokenSlot::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AppError::ConfigurationError(_)));
    }

    #[test]
    fn sign_up_payload_without_session_is_user_only() {
        let payload: SignUpPayload = serde_json::from_value(json!({
            "id": "u-1",
            "email": "a@example.com",
            "user_metadata": { "role": "instructor" }
        }))
        .unwrap();
        assert!(matches!(payload, SignUpPayload::User(_)));
    }
}
