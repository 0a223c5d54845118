use tracing::info;

// モジュール定義
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod shared;
pub mod state;

pub use shared::config::AppConfig;
pub use shared::error::AppError;
pub use state::AppState;

/// 環境変数から設定を読み、状態を組み立てて常駐タスクを起動する。
pub async fn start() -> anyhow::Result<AppState> {
    init_logging();

    info!("Ganesha core starting...");

    let config = AppConfig::from_env();
    let app_state = AppState::new(config).await?;
    app_state.start_background_tasks();

    info!("Application setup complete");
    Ok(app_state)
}

/// ログ設定の初期化。二度目以降の呼び出しは無視する。
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ganesha=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
