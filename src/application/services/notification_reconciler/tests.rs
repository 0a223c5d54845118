use super::*;
use crate::application::ports::row_store::{Query, RowStore};
use crate::domain::value_objects::Row;
use crate::domain::entities::notification::KIND_ANNOUNCEMENT;
use crate::domain::entities::NotificationDraft;
use crate::infrastructure::gateway::{InMemoryBackend, RealtimeMode};
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Default)]
struct RecordingListener {
    events: Option<UnboundedSender<ChangeKind>>,
    ticks: AtomicUsize,
    subscribed: AtomicUsize,
}

impl NotificationListener for RecordingListener {
    fn on_event(&self, event: &ChangeEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event.kind);
        }
    }

    fn on_fallback_tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    fn on_subscribed(&self) {
        self.subscribed.fetch_add(1, Ordering::SeqCst);
    }
}

fn setup() -> (Arc<InMemoryBackend>, Arc<NotificationReconciler>) {
    let backend = Arc::new(InMemoryBackend::new());
    let notifications = Arc::new(NotificationService::new(backend.clone(), 50));
    let reconciler = Arc::new(NotificationReconciler::new(
        backend.clone(),
        notifications,
        RealtimeConfig::default(),
    ));
    (backend, reconciler)
}

fn user(id: &str) -> PrincipalId {
    PrincipalId::new(id).unwrap()
}

async fn wait_phase(
    phase: &mut watch::Receiver<SubscriptionPhase>,
    predicate: impl FnMut(&SubscriptionPhase) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(600), phase.wait_for(predicate))
        .await
        .expect("phase wait timed out")
        .map(|_| ())
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn inserted_notification_reaches_loaded_view() {
    let (backend, reconciler) = setup();
    let me = user("u-1");
    reconciler.refresh(&me, NotificationView::All).await.unwrap();

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let listener = Arc::new(RecordingListener {
        events: Some(events_tx),
        ..Default::default()
    });
    let subscription = reconciler.subscribe(me.clone(), listener.clone());
    let mut phase = subscription.watch_phase();
    wait_phase(&mut phase, |p| matches!(p, SubscriptionPhase::Subscribed)).await;
    assert_eq!(listener.subscribed.load(Ordering::SeqCst), 1);

    let draft = NotificationDraft::new(me.clone(), KIND_ANNOUNCEMENT, "Belt grading on Sunday");
    backend
        .insert(NOTIFICATIONS_TABLE, draft.into_row(Utc::now()))
        .await
        .unwrap();
    assert_eq!(events_rx.recv().await, Some(ChangeKind::Insert));

    let cached = reconciler
        .cache()
        .snapshot(&me, NotificationView::All)
        .await
        .unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].message, "Belt grading on Sunday");
    assert_eq!(reconciler.cache().unread_count(&me).await, Some(1));

    subscription.unsubscribe().await;
}

#[tokio::test(start_paused = true)]
async fn repeated_channel_errors_fall_back_to_polling() {
    let (backend, reconciler) = setup();
    backend.set_realtime_mode(RealtimeMode::Failing(ChannelStatus::ChannelError));
    let listener = Arc::new(RecordingListener::default());

    let subscription = reconciler.subscribe(user("u-1"), listener.clone());
    let mut phase = subscription.watch_phase();
    wait_phase(&mut phase, |p| matches!(p, SubscriptionPhase::FallbackPolling)).await;
    // 初回 + 再試行 2 回
    assert_eq!(backend.opened_channels(), 3);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(listener.ticks.load(Ordering::SeqCst) >= 2);
    assert_eq!(listener.subscribed.load(Ordering::SeqCst), 0);

    subscription.unsubscribe().await;
}

#[tokio::test(start_paused = true)]
async fn becoming_visible_recovers_from_polling() {
    let (backend, reconciler) = setup();
    backend.set_realtime_mode(RealtimeMode::Refuse);
    let listener = Arc::new(RecordingListener::default());

    let subscription = reconciler.subscribe(user("u-1"), listener.clone());
    let mut phase = subscription.watch_phase();
    wait_phase(&mut phase, |p| matches!(p, SubscriptionPhase::FallbackPolling)).await;

    backend.set_realtime_mode(RealtimeMode::Healthy);
    subscription.notify_visible();
    wait_phase(&mut phase, |p| matches!(p, SubscriptionPhase::Subscribed)).await;
    assert_eq!(backend.active_channels(), 1);

    let ticks = listener.ticks.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(listener.ticks.load(Ordering::SeqCst), ticks);

    subscription.unsubscribe().await;
}

#[tokio::test(start_paused = true)]
async fn silent_channel_times_out_and_retries() {
    let (backend, reconciler) = setup();
    backend.set_realtime_mode(RealtimeMode::Silent);

    let subscription = reconciler.subscribe(user("u-1"), Arc::new(RecordingListener::default()));
    let mut phase = subscription.watch_phase();
    wait_phase(&mut phase, |p| matches!(p, SubscriptionPhase::Subscribing { attempt: 1 })).await;
    assert_eq!(backend.opened_channels(), 2);
    wait_phase(&mut phase, |p| matches!(p, SubscriptionPhase::FallbackPolling)).await;
    assert_eq!(backend.opened_channels(), 3);
    // タイムアウトしたチャネルは片付いている
    assert_eq!(backend.active_channels(), 0);

    subscription.unsubscribe().await;
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_removes_the_channel() {
    let (backend, reconciler) = setup();
    let subscription = reconciler.subscribe(user("u-1"), Arc::new(RecordingListener::default()));
    let mut phase = subscription.watch_phase();
    wait_phase(&mut phase, |p| matches!(p, SubscriptionPhase::Subscribed)).await;
    assert_eq!(backend.active_channels(), 1);

    subscription.unsubscribe().await;
    assert_eq!(backend.active_channels(), 0);
    assert_eq!(*phase.borrow(), SubscriptionPhase::Closed);
}

#[tokio::test(start_paused = true)]
async fn server_disconnect_is_retried() {
    let (backend, reconciler) = setup();
    let subscription = reconciler.subscribe(user("u-1"), Arc::new(RecordingListener::default()));
    let mut phase = subscription.watch_phase();
    wait_phase(&mut phase, |p| matches!(p, SubscriptionPhase::Subscribed)).await;

    backend.broadcast_status(ChannelStatus::Closed);
    wait_phase(&mut phase, |p| matches!(p, SubscriptionPhase::Retrying { attempt: 1 })).await;
    wait_phase(&mut phase, |p| matches!(p, SubscriptionPhase::Subscribed)).await;
    assert_eq!(backend.opened_channels(), 2);

    subscription.unsubscribe().await;
}

#[tokio::test]
async fn foreign_and_partial_events() {
    let (backend, reconciler) = setup();
    let me = user("u-1");
    backend.seed(
        NOTIFICATIONS_TABLE,
        vec![json!({
            "id": 4,
            "user_id": "u-1",
            "type": "approval",
            "message": "Your student edit request was approved.",
            "is_read": false,
            "created_at": "2024-05-01T10:00:00Z"
        })],
    );
    reconciler.refresh(&me, NotificationView::All).await.unwrap();

    let foreign = json!({
        "id": 9,
        "user_id": "u-2",
        "message": "not yours",
        "is_read": false,
        "created_at": "2024-05-01T11:00:00Z"
    });
    let event = ChangeEvent::insert(foreign.as_object().cloned().unwrap());
    assert!(!reconciler.apply_event(&me, &event).await);

    // 主キーだけの DELETE
    let event = ChangeEvent::delete(json!({ "id": 4 }).as_object().cloned().unwrap());
    assert!(reconciler.apply_event(&me, &event).await);
    let cached = reconciler
        .cache()
        .snapshot(&me, NotificationView::All)
        .await
        .unwrap();
    assert!(cached.is_empty());
}

/// select がサーバー側の結果を取った直後で止まる RowStore。
struct GatedRows {
    inner: Arc<InMemoryBackend>,
    gated: std::sync::atomic::AtomicBool,
    snapshot_taken: tokio::sync::Notify,
    release: tokio::sync::Notify,
}

#[async_trait::async_trait]
impl RowStore for GatedRows {
    async fn insert(&self, table: &str, row: Row) -> Result<Row, AppError> {
        self.inner.insert(table, row).await
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> Result<Row, AppError> {
        self.inner.upsert(table, row, on_conflict).await
    }

    async fn update(&self, table: &str, filter: &Filter, patch: Row) -> Result<Vec<Row>, AppError> {
        self.inner.update(table, filter, patch).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, AppError> {
        self.inner.delete(table, filter).await
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>, AppError> {
        let rows = self.inner.select(table, query).await?;
        if self.gated.load(Ordering::SeqCst) {
            self.snapshot_taken.notify_one();
            self.release.notified().await;
        }
        Ok(rows)
    }
}

fn notification_row(id: i64, owner: &str) -> Row {
    json!({
        "id": id,
        "user_id": owner,
        "type": KIND_ANNOUNCEMENT,
        "message": format!("notice {id}"),
        "is_read": false,
        "created_at": "2024-05-01T10:00:00Z"
    })
    .as_object()
    .cloned()
    .unwrap()
}

#[tokio::test]
async fn event_during_refetch_is_kept() {
    let backend = Arc::new(InMemoryBackend::new());
    let rows = Arc::new(GatedRows {
        inner: backend.clone(),
        gated: std::sync::atomic::AtomicBool::new(false),
        snapshot_taken: tokio::sync::Notify::new(),
        release: tokio::sync::Notify::new(),
    });
    let notifications = Arc::new(NotificationService::new(rows.clone(), 50));
    let reconciler = Arc::new(NotificationReconciler::new(
        backend.clone(),
        notifications,
        RealtimeConfig::default(),
    ));
    let me = user("u-1");
    backend
        .insert(NOTIFICATIONS_TABLE, notification_row(1, "u-1"))
        .await
        .unwrap();
    reconciler.refresh(&me, NotificationView::All).await.unwrap();

    rows.gated.store(true, Ordering::SeqCst);
    let refetch = tokio::spawn({
        let reconciler = reconciler.clone();
        let me = me.clone();
        async move { reconciler.refresh(&me, NotificationView::All).await }
    });
    rows.snapshot_taken.notified().await;

    assert!(
        reconciler
            .apply_event(&me, &ChangeEvent::insert(notification_row(5, "u-1")))
            .await
    );
    assert_eq!(
        reconciler
            .cache()
            .snapshot(&me, NotificationView::All)
            .await
            .unwrap()
            .len(),
        2
    );

    rows.release.notify_one();
    let refetched = refetch.await.unwrap().unwrap();
    assert_eq!(refetched.len(), 2);
    let cached = reconciler
        .cache()
        .snapshot(&me, NotificationView::All)
        .await
        .unwrap();
    assert_eq!(cached[0].id.as_str(), "5");
    assert_eq!(cached.len(), 2);
}
