use crate::application::ports::auth_gateway::{AuthGateway, AuthSession, SignUpRequest};
use crate::application::ports::object_storage::ObjectStorage;
use crate::application::ports::realtime_gateway::{
    ChangeEvent, ChannelMessage, ChannelStatus, RealtimeChannel, RealtimeGateway,
};
use crate::application::ports::row_store::{loose_eq, Filter, Query, RowStore};
use crate::domain::entities::{Principal, RoleClaims};
use crate::domain::value_objects::{PrincipalId, Row};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

const SESSION_TTL_SECS: i64 = 3_600;

/// 購読チャネルの振る舞い。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RealtimeMode {
    #[default]
    Healthy,
    /// 開くたびに指定のステータスを返す
    Failing(ChannelStatus),
    /// 応答しない。購読タイムアウトの確認用
    Silent,
    /// open_channel 自体がエラー
    Refuse,
}

struct ScheduledFailure {
    skip: usize,
    error: AppError,
}

struct ChannelEntry {
    table: String,
    filter: Filter,
    sender: mpsc::UnboundedSender<ChannelMessage>,
}

struct StoredUser {
    password: String,
    principal: Principal,
}

#[derive(Default)]
struct BackendState {
    tables: HashMap<String, Vec<Row>>,
    next_ids: HashMap<String, i64>,
    failures: HashMap<String, VecDeque<ScheduledFailure>>,
    unreachable: bool,
    realtime_mode: RealtimeMode,
    channels: HashMap<String, ChannelEntry>,
    opened_channels: usize,
    users: HashMap<String, StoredUser>,
    access_tokens: HashMap<String, Principal>,
    refresh_tokens: HashMap<String, Principal>,
    objects: HashMap<String, Vec<u8>>,
}

impl BackendState {
    fn check(&mut self, table: &str) -> Result<(), AppError> {
        if self.unreachable {
            return Err(AppError::TransientNetwork("backend unreachable".into()));
        }
        let Some(queue) = self.failures.get_mut(table) else {
            return Ok(());
        };
        match queue.front_mut() {
            Some(next) if next.skip > 0 => {
                next.skip -= 1;
                Ok(())
            }
            Some(_) => match queue.pop_front() {
                Some(failure) => Err(failure.error),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    fn next_id(&mut self, table: &str) -> i64 {
        let next = self.next_ids.entry(table.to_string()).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    fn fan_out(&mut self, table: &str, event: ChangeEvent) {
        let Some(row) = event.new.as_ref().or(event.old.as_ref()) else {
            return;
        };
        self.channels.retain(|_, channel| {
            if channel.table != table || !channel.filter.matches(row) {
                return true;
            }
            channel
                .sender
                .send(ChannelMessage::Change(event.clone()))
                .is_ok()
        });
    }

    fn issue_session(&mut self, principal: Principal) -> AuthSession {
        let access_token = format!("access-{}", Uuid::new_v4());
        let refresh_token = format!("refresh-{}", Uuid::new_v4());
        self.access_tokens
            .insert(access_token.clone(), principal.clone());
        self.refresh_tokens
            .insert(refresh_token.clone(), principal.clone());
        AuthSession {
            access_token,
            refresh_token: Some(refresh_token),
            expires_at: Some(Utc::now().timestamp() + SESSION_TTL_SECS),
            principal,
        }
    }
}

/// プロセス内で完結するバックエンド。行ストア・認証・リアルタイム・ストレージを兼ねる。
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<BackendState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 行を直接入れる。変更イベントは出さない。
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut state = self.state();
        let mut max_id = 0;
        for value in rows {
            if let Value::Object(row) = value {
                if let Some(id) = row.get("id").and_then(Value::as_i64) {
                    max_id = max_id.max(id);
                }
                state.tables.entry(table.to_string()).or_default().push(row);
            }
        }
        let next = state.next_ids.entry(table.to_string()).or_insert(1);
        *next = (*next).max(max_id + 1);
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    /// 次の 1 回の操作を失敗させる。
    pub fn inject_failure(&self, table: &str, error: AppError) {
        self.inject_failure_after(table, 0, error);
    }

    /// `successes` 回成功した後の操作を 1 回失敗させる。
    pub fn inject_failure_after(&self, table: &str, successes: usize, error: AppError) {
        self.state()
            .failures
            .entry(table.to_string())
            .or_default()
            .push_back(ScheduledFailure {
                skip: successes,
                error,
            });
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state().unreachable = !reachable;
    }

    pub fn set_realtime_mode(&self, mode: RealtimeMode) {
        self.state().realtime_mode = mode;
    }

    pub fn opened_channels(&self) -> usize {
        self.state().opened_channels
    }

    pub fn active_channels(&self) -> usize {
        self.state().channels.len()
    }

    /// 開いている全チャネルにステータスを流す。接続断の再現用。
    pub fn broadcast_status(&self, status: ChannelStatus) {
        let state = self.state();
        for channel in state.channels.values() {
            let _ = channel.sender.send(ChannelMessage::Status(status));
        }
    }

    pub fn register_user(&self, email: &str, password: &str, claims: RoleClaims) -> Principal {
        let mut state = self.state();
        let mut principal = Principal::new(PrincipalId::generate(), claims);
        principal.email = Some(email.to_string());
        state.users.insert(
            email.to_lowercase(),
            StoredUser {
                password: password.to_string(),
                principal: principal.clone(),
            },
        );
        principal
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.state().objects.get(&format!("{bucket}/{path}")).cloned()
    }
}

fn matches_conflict(existing: &Row, incoming: &Row, columns: &[&str]) -> bool {
    !columns.is_empty()
        && columns.iter().all(|column| {
            let left = existing.get(*column).unwrap_or(&Value::Null);
            let right = incoming.get(*column).unwrap_or(&Value::Null);
            !left.is_null() && loose_eq(left, right)
        })
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l
            .as_f64()
            .partial_cmp(&r.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => left.to_string().cmp(&right.to_string()),
    }
}

#[async_trait]
impl RowStore for InMemoryBackend {
    async fn insert(&self, table: &str, row: Row) -> Result<Row, AppError> {
        let mut state = self.state();
        state.check(table)?;
        let mut row = row;
        if !row.contains_key("id") {
            let id = state.next_id(table);
            row.insert("id".into(), Value::from(id));
        }
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        state.fan_out(table, ChangeEvent::insert(row.clone()));
        Ok(row)
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, AppError> {
        let columns: Vec<&str> = on_conflict
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        let mut state = self.state();
        state.check(table)?;

        let rows = state.tables.entry(table.to_string()).or_default();
        if let Some(existing) = rows
            .iter_mut()
            .find(|existing| matches_conflict(existing, &row, &columns))
        {
            let old = existing.clone();
            for (key, value) in row {
                existing.insert(key, value);
            }
            let updated = existing.clone();
            state.fan_out(table, ChangeEvent::update(Some(old), updated.clone()));
            return Ok(updated);
        }

        let mut row = row;
        if !row.contains_key("id") {
            let id = state.next_id(table);
            row.insert("id".into(), Value::from(id));
        }
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        state.fan_out(table, ChangeEvent::insert(row.clone()));
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        patch: Row,
    ) -> Result<Vec<Row>, AppError> {
        let mut state = self.state();
        state.check(table)?;

        let mut changes = Vec::new();
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| filter.matches(row)) {
                let old = row.clone();
                for (key, value) in &patch {
                    row.insert(key.clone(), value.clone());
                }
                changes.push((old, row.clone()));
            }
        }

        let mut updated = Vec::with_capacity(changes.len());
        for (old, new) in changes {
            state.fan_out(table, ChangeEvent::update(Some(old), new.clone()));
            updated.push(new);
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, AppError> {
        let mut state = self.state();
        state.check(table)?;

        let mut removed = Vec::new();
        if let Some(rows) = state.tables.get_mut(table) {
            rows.retain(|row| {
                if filter.matches(row) {
                    removed.push(row.clone());
                    false
                } else {
                    true
                }
            });
        }
        for row in &removed {
            state.fan_out(table, ChangeEvent::delete(row.clone()));
        }
        Ok(removed)
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, AppError> {
        let mut state = self.state();
        state.check(table)?;

        let mut rows: Vec<Row> = state
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filter.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(&order.column).unwrap_or(&Value::Null),
                    b.get(&order.column).unwrap_or(&Value::Null),
                );
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }
}

#[async_trait]
impl RealtimeGateway for InMemoryBackend {
    async fn open_channel(
        &self,
        name: &str,
        table: &str,
        filter: &Filter,
    ) -> Result<RealtimeChannel, AppError> {
        let mut state = self.state();
        state.opened_channels += 1;
        let id = format!("{name}#{}", state.opened_channels);
        let (sender, messages) = mpsc::unbounded_channel();

        match state.realtime_mode {
            RealtimeMode::Refuse => {
                return Err(AppError::TransientNetwork("realtime refused".into()));
            }
            RealtimeMode::Failing(status) => {
                let _ = sender.send(ChannelMessage::Status(status));
            }
            RealtimeMode::Healthy | RealtimeMode::Silent => {
                if state.realtime_mode == RealtimeMode::Healthy {
                    let _ = sender.send(ChannelMessage::Status(ChannelStatus::Subscribed));
                }
                state.channels.insert(
                    id.clone(),
                    ChannelEntry {
                        table: table.to_string(),
                        filter: filter.clone(),
                        sender,
                    },
                );
            }
        }
        debug!(channel = %id, table, "opened in-memory channel");
        Ok(RealtimeChannel { id, messages })
    }

    async fn remove_channel(&self, channel_id: &str) -> Result<(), AppError> {
        self.state().channels.remove(channel_id);
        Ok(())
    }
}

#[async_trait]
impl AuthGateway for InMemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AppError> {
        let mut state = self.state();
        state.check("auth")?;
        let principal = match state.users.get(&email.to_lowercase()) {
            Some(user) if user.password == password => user.principal.clone(),
            _ => return Err(AppError::Unauthorized("Invalid login credentials".into())),
        };
        Ok(state.issue_session(principal))
    }

    async fn sign_up(&self, request: SignUpRequest) -> Result<Option<AuthSession>, AppError> {
        {
            let mut state = self.state();
            state.check("auth")?;
            if state.users.contains_key(&request.email.to_lowercase()) {
                return Err(AppError::Conflict("User already registered".into()));
            }
        }
        let principal = self.register_user(&request.email, &request.password, request.claims);
        Ok(Some(self.state().issue_session(principal)))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let mut state = self.state();
        state.check("auth")?;
        if let Some(principal) = state.access_tokens.remove(access_token) {
            state
                .refresh_tokens
                .retain(|_, owner| owner.id != principal.id);
        }
        Ok(())
    }

    async fn reset_password(&self, email: &str) -> Result<(), AppError> {
        let mut state = self.state();
        state.check("auth")?;
        debug!(known = state.users.contains_key(&email.to_lowercase()), "password reset requested");
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, AppError> {
        let mut state = self.state();
        state.check("auth")?;
        let principal = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".into()))?;
        Ok(state.issue_session(principal))
    }

    async fn get_user(&self, access_token: &str) -> Result<Principal, AppError> {
        let mut state = self.state();
        state.check("auth")?;
        state
            .access_tokens
            .get(access_token)
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Invalid access token".into()))
    }
}

#[async_trait]
impl ObjectStorage for InMemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, AppError> {
        let mut state = self.state();
        state.check("storage")?;
        state.objects.insert(format!("{bucket}/{path}"), bytes);
        Ok(format!("memory://{bucket}/{path}"))
    }
}
