use crate::application::ports::{AuthGateway, ObjectStorage, RealtimeGateway, RowStore};
use crate::application::services::{
    ApprovalService, AuthService, ConnectivityMonitor, InstructorService, MediaService,
    NotificationReconciler, NotificationService, OfflineQueueService, SessionResolver,
};
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::gateway::{
    AccessTokenSlot, InMemoryBackend, RestBackend, WebSocketRealtime,
};
use crate::infrastructure::offline::SqliteQueueStore;
use crate::presentation::handlers::{
    ApprovalHandler, AttendanceHandler, MediaHandler, NotificationHandler, SessionHandler,
};
use crate::shared::config::AppConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// 外部バックエンドの各ポート実装
#[derive(Clone)]
pub struct Backends {
    pub rows: Arc<dyn RowStore>,
    pub auth: Arc<dyn AuthGateway>,
    pub realtime: Arc<dyn RealtimeGateway>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl Backends {
    pub fn hosted(config: &AppConfig) -> anyhow::Result<Self> {
        let token = AccessTokenSlot::new();
        let rest = Arc::new(RestBackend::new(&config.backend, token.clone())?);
        let realtime = Arc::new(WebSocketRealtime::new(&config.backend, token)?);
        Ok(Self {
            rows: rest.clone(),
            auth: rest.clone(),
            realtime,
            storage: rest,
        })
    }

    pub fn in_memory(backend: Arc<InMemoryBackend>) -> Self {
        Self {
            rows: backend.clone(),
            auth: backend.clone(),
            realtime: backend.clone(),
            storage: backend,
        }
    }
}

/// アプリケーション全体の状態を管理する構造体
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: ConnectionPool,
    pub connectivity: Arc<ConnectivityMonitor>,

    pub instructor_service: Arc<InstructorService>,
    pub notification_service: Arc<NotificationService>,
    pub approval_service: Arc<ApprovalService>,
    pub auth_service: Arc<AuthService>,
    pub notification_reconciler: Arc<NotificationReconciler>,
    pub offline_queue_service: Arc<OfflineQueueService>,
    pub media_service: Arc<MediaService>,

    pub approval_handler: Arc<ApprovalHandler>,
    pub notification_handler: Arc<NotificationHandler>,
    pub attendance_handler: Arc<AttendanceHandler>,
    pub session_handler: Arc<SessionHandler>,
    pub media_handler: Arc<MediaHandler>,
}

impl AppState {
    /// ホスト型バックエンドとローカル SQLite で起動する。
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;
        let backends = Backends::hosted(&config)?;
        let db_pool = ConnectionPool::new(&config.offline.database_url).await?;
        Self::assemble(config, backends, db_pool).await
    }

    /// プロセス内バックエンドとメモリ上の SQLite で起動する。
    pub async fn in_memory(config: AppConfig, backend: Arc<InMemoryBackend>) -> anyhow::Result<Self> {
        let db_pool = ConnectionPool::from_memory().await?;
        Self::assemble(config, Backends::in_memory(backend), db_pool).await
    }

    async fn assemble(
        config: AppConfig,
        backends: Backends,
        db_pool: ConnectionPool,
    ) -> anyhow::Result<Self> {
        db_pool.migrate().await?;

        let instructor_service = Arc::new(InstructorService::new(backends.rows.clone()));
        let notification_service = Arc::new(NotificationService::new(
            backends.rows.clone(),
            config.notifications.fetch_limit,
        ));
        let approval_service = Arc::new(ApprovalService::new(
            backends.rows.clone(),
            instructor_service.clone(),
            notification_service.clone(),
        ));
        let notification_reconciler = Arc::new(NotificationReconciler::new(
            backends.realtime.clone(),
            notification_service.clone(),
            config.realtime.clone(),
        ));
        let resolver = Arc::new(SessionResolver::new(instructor_service.clone()));
        let auth_service = Arc::new(AuthService::new(
            backends.auth.clone(),
            resolver,
            instructor_service.clone(),
            Some(notification_reconciler.clone()),
        ));

        let connectivity = Arc::new(ConnectivityMonitor::new(true));
        let queue_store = Arc::new(SqliteQueueStore::new(
            db_pool.clone(),
            config.offline.queue_key.clone(),
        ));
        let offline_queue_service = Arc::new(OfflineQueueService::new(
            queue_store,
            backends.rows.clone(),
            connectivity.subscribe(),
        ));
        let media_service = Arc::new(MediaService::new(backends.storage.clone()));

        let approval_handler = Arc::new(ApprovalHandler::new(
            approval_service.clone(),
            auth_service.clone(),
        ));
        let notification_handler = Arc::new(NotificationHandler::new(
            notification_reconciler.clone(),
            notification_service.clone(),
            instructor_service.clone(),
            auth_service.clone(),
        ));
        let attendance_handler = Arc::new(AttendanceHandler::new(
            offline_queue_service.clone(),
            auth_service.clone(),
        ));
        let session_handler = Arc::new(SessionHandler::new(auth_service.clone()));
        let media_handler = Arc::new(MediaHandler::new(
            media_service.clone(),
            auth_service.clone(),
        ));

        info!("application state initialised");
        Ok(Self {
            config: Arc::new(config),
            db_pool,
            connectivity,
            instructor_service,
            notification_service,
            approval_service,
            auth_service,
            notification_reconciler,
            offline_queue_service,
            media_service,
            approval_handler,
            notification_handler,
            attendance_handler,
            session_handler,
            media_handler,
        })
    }

    /// 接続復帰時のキュー送信を起動する。
    pub fn start_background_tasks(&self) -> JoinHandle<()> {
        self.offline_queue_service.spawn_reconnect_drain()
    }

    pub async fn shutdown(&self) {
        self.auth_service.sign_out().await;
        self.db_pool.close().await;
    }
}
