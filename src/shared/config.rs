use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_QUEUE_KEY: &str = "ganesha_attendance_queue";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub realtime: RealtimeConfig,
    pub offline: OfflineConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub init_delay_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub subscribe_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub recovery_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineConfig {
    pub database_url: String,
    pub queue_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub fetch_limit: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            init_delay_ms: 300,
            max_retries: 2,
            retry_delay_ms: 3_000,
            subscribe_timeout_ms: 15_000,
            poll_interval_ms: 25_000,
            recovery_delay_ms: 500,
        }
    }
}

impl RealtimeConfig {
    pub fn init_delay(&self) -> Duration {
        Duration::from_millis(self.init_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_millis(self.subscribe_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }
}

impl Default for OfflineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .map(|dir| dir.join("ganesha"))
            .unwrap_or_else(|| std::path::PathBuf::from("./data"));
        Self {
            database_url: format!("sqlite://{}/offline.db?mode=rwc", data_dir.display()),
            queue_key: DEFAULT_QUEUE_KEY.to_string(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { fetch_limit: 50 }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("GANESHA_BACKEND_URL") {
            cfg.backend.url = v.trim().trim_end_matches('/').to_string();
        }
        if let Ok(v) = std::env::var("GANESHA_BACKEND_ANON_KEY") {
            cfg.backend.anon_key = v.trim().to_string();
        }
        if let Some(value) = env_u64("GANESHA_REQUEST_TIMEOUT_SECS") {
            cfg.backend.request_timeout_secs = value.max(1);
        }

        if let Some(value) = env_u64("GANESHA_REALTIME_MAX_RETRIES") {
            cfg.realtime.max_retries = value.min(u32::MAX as u64) as u32;
        }
        if let Some(value) = env_u64("GANESHA_REALTIME_RETRY_DELAY_MS") {
            cfg.realtime.retry_delay_ms = value;
        }
        if let Some(value) = env_u64("GANESHA_REALTIME_SUBSCRIBE_TIMEOUT_MS") {
            cfg.realtime.subscribe_timeout_ms = value.max(1);
        }
        if let Some(value) = env_u64("GANESHA_POLL_INTERVAL_MS") {
            cfg.realtime.poll_interval_ms = value.max(1);
        }

        if let Ok(v) = std::env::var("GANESHA_OFFLINE_DATABASE_URL") {
            cfg.offline.database_url = v;
        }
        if let Ok(v) = std::env::var("GANESHA_OFFLINE_QUEUE_KEY") {
            if !v.trim().is_empty() {
                cfg.offline.queue_key = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("GANESHA_NOTIFICATION_FETCH_LIMIT") {
            cfg.notifications.fetch_limit = value.clamp(1, 500) as u32;
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.backend.url.is_empty() {
            return Err("Backend url must be set".to_string());
        }
        if !self.backend.url.starts_with("http://") && !self.backend.url.starts_with("https://") {
            return Err("Backend url must be an http(s) url".to_string());
        }
        if self.backend.anon_key.is_empty() {
            return Err("Backend anon key must be set".to_string());
        }
        if self.realtime.poll_interval_ms == 0 {
            return Err("Realtime poll_interval_ms must be greater than 0".to_string());
        }
        if self.realtime.subscribe_timeout_ms == 0 {
            return Err("Realtime subscribe_timeout_ms must be greater than 0".to_string());
        }
        if self.offline.queue_key.trim().is_empty() {
            return Err("Offline queue_key must not be empty".to_string());
        }
        if self.notifications.fetch_limit == 0 {
            return Err("Notification fetch_limit must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
