use super::rest::filter_params;
use super::token::AccessTokenSlot;
use crate::application::ports::realtime_gateway::{
    ChangeEvent, ChangeKind, ChannelMessage, ChannelStatus, RealtimeChannel, RealtimeGateway,
};
use crate::application::ports::row_store::Filter;
use crate::shared::config::BackendConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const JOIN_REF: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PhoenixFrame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

/// Phoenix チャネル互換のリアルタイム接続。チャネルごとに 1 本のソケットを張る。
pub struct WebSocketRealtime {
    endpoint: Url,
    token: AccessTokenSlot,
    channels: Mutex<HashMap<String, CancellationToken>>,
    next_id: AtomicU64,
}

impl WebSocketRealtime {
    pub fn new(config: &BackendConfig, token: AccessTokenSlot) -> Result<Self, AppError> {
        Ok(Self {
            endpoint: realtime_endpoint(config)?,
            token,
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    fn channels(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn realtime_endpoint(config: &BackendConfig) -> Result<Url, AppError> {
    let invalid = |detail: String| AppError::ConfigurationError(format!("realtime url: {detail}"));
    let mut url = Url::parse(&config.url).map_err(|err| invalid(err.to_string()))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid("cannot switch scheme".into()))?;
    let mut url = url
        .join("realtime/v1/websocket")
        .map_err(|err| invalid(err.to_string()))?;
    url.query_pairs_mut()
        .append_pair("apikey", &config.anon_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

/// 行フィルタの先頭条件だけをリアルタイム側に渡せる。
fn realtime_filter(filter: &Filter) -> Option<String> {
    filter_params(filter)
        .into_iter()
        .next()
        .map(|(column, value)| format!("{column}={value}"))
}

fn join_frame(topic: &str, table: &str, filter: Option<String>, token: Option<String>) -> PhoenixFrame {
    let mut change = json!({ "event": "*", "schema": "public", "table": table });
    if let Some(filter) = filter {
        change["filter"] = Value::String(filter);
    }
    let mut payload = json!({ "config": { "postgres_changes": [change] } });
    if let Some(token) = token {
        payload["access_token"] = Value::String(token);
    }
    PhoenixFrame {
        topic: topic.to_string(),
        event: "phx_join".into(),
        payload,
        reference: Some(JOIN_REF.into()),
    }
}

fn control_frame(topic: &str, event: &str, reference: u64) -> PhoenixFrame {
    PhoenixFrame {
        topic: topic.to_string(),
        event: event.to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

fn decode_frame(topic: &str, text: &str) -> Option<ChannelMessage> {
    let frame: PhoenixFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            debug!(error = %err, "unparseable realtime frame");
            return None;
        }
    };
    if frame.topic != topic {
        return None;
    }
    let status = frame.payload.get("status").and_then(Value::as_str);
    match frame.event.as_str() {
        "phx_reply" if frame.reference.as_deref() == Some(JOIN_REF) => match status {
            Some("ok") => Some(ChannelMessage::Status(ChannelStatus::Subscribed)),
            _ => Some(ChannelMessage::Status(ChannelStatus::ChannelError)),
        },
        "system" if status == Some("error") => {
            Some(ChannelMessage::Status(ChannelStatus::ChannelError))
        }
        "phx_error" => Some(ChannelMessage::Status(ChannelStatus::ChannelError)),
        "phx_close" => Some(ChannelMessage::Status(ChannelStatus::Closed)),
        "postgres_changes" => decode_change(frame.payload.get("data")?),
        _ => None,
    }
}

fn decode_change(data: &Value) -> Option<ChannelMessage> {
    let kind = match data.get("type").and_then(Value::as_str)? {
        "INSERT" => ChangeKind::Insert,
        "UPDATE" => ChangeKind::Update,
        "DELETE" => ChangeKind::Delete,
        _ => return None,
    };
    let row = |key: &str| match data.get(key) {
        Some(Value::Object(row)) if !row.is_empty() => Some(row.clone()),
        _ => None,
    };
    Some(ChannelMessage::Change(ChangeEvent {
        kind,
        old: row("old_record"),
        new: row("record"),
    }))
}

fn encode(frame: &PhoenixFrame) -> Option<Message> {
    serde_json::to_string(frame).ok().map(Message::Text)
}

async fn run_connection(
    endpoint: Url,
    join: PhoenixFrame,
    sender: mpsc::UnboundedSender<ChannelMessage>,
    cancel: CancellationToken,
) {
    let topic = join.topic.clone();
    let connected = tokio::select! {
        _ = cancel.cancelled() => return,
        result = connect_async(endpoint.as_str()) => result,
    };
    let stream = match connected {
        Ok((stream, _)) => stream,
        Err(err) => {
            warn!(topic = %topic, error = %err, "realtime connect failed");
            let _ = sender.send(ChannelMessage::Status(ChannelStatus::ChannelError));
            return;
        }
    };
    let (mut write, mut read) = stream.split();

    let Some(join) = encode(&join) else {
        let _ = sender.send(ChannelMessage::Status(ChannelStatus::ChannelError));
        return;
    };
    if let Err(err) = write.send(join).await {
        warn!(topic = %topic, error = %err, "realtime join failed");
        let _ = sender.send(ChannelMessage::Status(ChannelStatus::ChannelError));
        return;
    }

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut reference: u64 = 1;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                reference += 1;
                if let Some(leave) = encode(&control_frame(&topic, "phx_leave", reference)) {
                    let _ = write.send(leave).await;
                }
                let _ = write.close().await;
                return;
            }
            _ = heartbeat.tick() => {
                reference += 1;
                let Some(beat) = encode(&control_frame("phoenix", "heartbeat", reference)) else {
                    continue;
                };
                if write.send(beat).await.is_err() {
                    let _ = sender.send(ChannelMessage::Status(ChannelStatus::Closed));
                    return;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(message) = decode_frame(&topic, &text) {
                        if sender.send(message).is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    let _ = sender.send(ChannelMessage::Status(ChannelStatus::Closed));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(topic = %topic, error = %err, "realtime socket error");
                    let _ = sender.send(ChannelMessage::Status(ChannelStatus::ChannelError));
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl RealtimeGateway for WebSocketRealtime {
    async fn open_channel(
        &self,
        name: &str,
        table: &str,
        filter: &Filter,
    ) -> Result<RealtimeChannel, AppError> {
        let topic = format!("realtime:{name}");
        let id = format!("{topic}#{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let join = join_frame(&topic, table, realtime_filter(filter), self.token.get());
        let (sender, messages) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        self.channels().insert(id.clone(), cancel.clone());
        tokio::spawn(run_connection(self.endpoint.clone(), join, sender, cancel));
        debug!(channel = %id, table, "realtime channel opening");
        Ok(RealtimeChannel { id, messages })
    }

    async fn remove_channel(&self, channel_id: &str) -> Result<(), AppError> {
        if let Some(cancel) = self.channels().remove(channel_id) {
            cancel.cancel();
        }
        Ok(())
    }
}
