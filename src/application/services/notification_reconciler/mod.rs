//! 通知のリアルタイム購読とキャッシュ整合。
//!
//! 購読ごとにタスクを 1 つ起動し、失敗時は一定回数まで再試行してから
//! ポーリングに切り替える。キャッシュへの書き込みはこのモジュールに閉じる。

mod cache;
mod state;
#[cfg(test)]
mod tests;

pub use cache::NotificationCache;
pub use state::{FailureReason, RetryPolicy, SubscriptionMachine, SubscriptionPhase, Transition};

use cache::CachePatch;

use super::notification_service::{NotificationService, NOTIFICATIONS_TABLE};
use crate::application::ports::realtime_gateway::{
    ChangeEvent, ChangeKind, ChannelMessage, ChannelStatus, RealtimeChannel, RealtimeGateway,
};
use crate::application::ports::row_store::{loose_eq, Filter};
use crate::domain::entities::{NotificationRecord, NotificationView};
use crate::domain::value_objects::{NotificationId, PrincipalId};
use crate::shared::config::RealtimeConfig;
use crate::shared::error::AppError;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 購読側のコールバック。どれも既定では何もしない。
pub trait NotificationListener: Send + Sync {
    fn on_event(&self, _event: &ChangeEvent) {}
    fn on_fallback_tick(&self) {}
    fn on_subscribed(&self) {}
}

impl RetryPolicy {
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            recovery_delay: config.recovery_delay(),
        }
    }
}

pub struct NotificationReconciler {
    realtime: Arc<dyn RealtimeGateway>,
    notifications: Arc<NotificationService>,
    cache: NotificationCache,
    config: RealtimeConfig,
}

impl NotificationReconciler {
    pub fn new(
        realtime: Arc<dyn RealtimeGateway>,
        notifications: Arc<NotificationService>,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            realtime,
            notifications,
            cache: NotificationCache::new(),
            config,
        }
    }

    pub fn cache(&self) -> &NotificationCache {
        &self.cache
    }

    /// 一覧を取り直してキャッシュに反映する。途中で対象が変わっていたら反映しない。
    pub async fn refresh(
        &self,
        user_id: &PrincipalId,
        view: NotificationView,
    ) -> Result<Vec<NotificationRecord>, AppError> {
        let ticket = self.cache.begin_fetch(user_id, view).await;
        let records = self.notifications.list(user_id, view).await?;
        match self.cache.complete_fetch(ticket, records.clone()).await {
            Some(current) => Ok(current),
            None => {
                debug!(user_id = %user_id, ?view, "discarded stale notification fetch");
                Ok(records)
            }
        }
    }

    pub async fn mark_read(
        &self,
        user_id: &PrincipalId,
        id: &NotificationId,
    ) -> Result<NotificationRecord, AppError> {
        let record = self.notifications.mark_read(user_id, id).await?;
        self.cache
            .apply(user_id, &CachePatch::Update(record.clone()))
            .await;
        Ok(record)
    }

    pub async fn mark_all_read(&self, user_id: &PrincipalId) -> Result<usize, AppError> {
        let records = self.notifications.mark_all_read(user_id).await?;
        for record in &records {
            self.cache
                .apply(user_id, &CachePatch::Update(record.clone()))
                .await;
        }
        Ok(records.len())
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// 変更イベントをキャッシュに当てる。他人宛てや解釈できない行は false。
    pub async fn apply_event(&self, user_id: &PrincipalId, event: &ChangeEvent) -> bool {
        match patch_from_event(user_id, event) {
            Some(patch) => {
                self.cache.apply(user_id, &patch).await;
                true
            }
            None => false,
        }
    }

    pub fn subscribe(
        self: &Arc<Self>,
        user_id: PrincipalId,
        listener: Arc<dyn NotificationListener>,
    ) -> NotificationSubscription {
        let cancel = CancellationToken::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(SubscriptionPhase::Init);

        let driver = SubscriptionDriver {
            reconciler: Arc::clone(self),
            user_id,
            listener,
            machine: SubscriptionMachine::new(RetryPolicy::from_config(&self.config)),
            commands: commands_rx,
            cancel: cancel.clone(),
            phase_tx,
            channel: None,
            retry_at: None,
            subscribe_deadline: None,
            poller: None,
        };
        let task = tokio::spawn(driver.run());

        NotificationSubscription {
            commands: commands_tx,
            cancel,
            phase: phase_rx,
            task: Some(task),
        }
    }
}

fn patch_from_event(user_id: &PrincipalId, event: &ChangeEvent) -> Option<CachePatch> {
    match event.kind {
        ChangeKind::Insert | ChangeKind::Update => {
            let row = event.new.clone()?;
            let record = match NotificationRecord::from_row(row) {
                Ok(record) => record,
                Err(err) => {
                    warn!(error = %err, "ignoring malformed notification event");
                    return None;
                }
            };
            if &record.user_id != user_id {
                return None;
            }
            if event.kind == ChangeKind::Insert {
                Some(CachePatch::Insert(record))
            } else {
                Some(CachePatch::Update(record))
            }
        }
        ChangeKind::Delete => {
            // DELETE の old は主キーだけのことがある
            let old = event.old.as_ref()?;
            if let Some(owner) = old.get("user_id") {
                if !loose_eq(owner, &user_id.to_value()) {
                    return None;
                }
            }
            let id = old.get("id").cloned()?;
            serde_json::from_value::<NotificationId>(id)
                .ok()
                .map(CachePatch::Remove)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Visible,
}

/// 購読ハンドル。drop でも購読は止まる。
pub struct NotificationSubscription {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    phase: watch::Receiver<SubscriptionPhase>,
    task: Option<JoinHandle<()>>,
}

impl NotificationSubscription {
    /// 画面が前面に戻ったことを伝える。ポーリング中なら購読をやり直す。
    pub fn notify_visible(&self) {
        let _ = self.commands.send(Command::Visible);
    }

    pub fn phase(&self) -> SubscriptionPhase {
        self.phase.borrow().clone()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SubscriptionPhase> {
        self.phase.clone()
    }

    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "notification subscription task ended abnormally");
            }
        }
    }
}

impl Drop for NotificationSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SubscriptionDriver {
    reconciler: Arc<NotificationReconciler>,
    user_id: PrincipalId,
    listener: Arc<dyn NotificationListener>,
    machine: SubscriptionMachine,
    commands: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    phase_tx: watch::Sender<SubscriptionPhase>,
    channel: Option<RealtimeChannel>,
    retry_at: Option<Instant>,
    subscribe_deadline: Option<Instant>,
    poller: Option<Interval>,
}

impl SubscriptionDriver {
    async fn run(mut self) {
        let init_delay = self.reconciler.config.init_delay();
        tokio::select! {
            _ = self.cancel.cancelled() => {
                self.shutdown().await;
                return;
            }
            _ = sleep(init_delay) => {}
        }

        let transition = self.machine.start();
        self.apply(transition).await;

        loop {
            self.publish();
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(command) = self.commands.recv() => self.handle_command(command).await,
                message = next_message(&mut self.channel) => self.handle_message(message).await,
                _ = wait_until(self.retry_at) => {
                    self.retry_at = None;
                    let transition = self.machine.on_retry_elapsed();
                    self.apply(transition).await;
                }
                _ = wait_until(self.subscribe_deadline) => {
                    self.subscribe_deadline = None;
                    self.fail(FailureReason::TimedOut).await;
                }
                _ = next_tick(&mut self.poller) => self.poll().await,
            }
        }

        self.shutdown().await;
    }

    fn publish(&self) {
        self.phase_tx.send_replace(self.machine.phase().clone());
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Visible => {
                let transition = self.machine.on_visible();
                if matches!(transition, Transition::Recover(_)) {
                    info!(user_id = %self.user_id, "recovering realtime notifications");
                }
                self.apply(transition).await;
            }
        }
    }

    async fn handle_message(&mut self, message: Option<ChannelMessage>) {
        match message {
            None => {
                self.channel = None;
                self.fail(FailureReason::Closed).await;
            }
            Some(ChannelMessage::Status(ChannelStatus::Subscribed)) => {
                if !matches!(self.machine.phase(), SubscriptionPhase::Subscribing { .. }) {
                    return;
                }
                self.subscribe_deadline = None;
                let transition = self.machine.on_subscribed();
                self.apply(transition).await;
                debug!(user_id = %self.user_id, "notification channel subscribed");
                self.listener.on_subscribed();
                // 切断中に取りこぼした分を取り直す
                self.refresh_views(false).await;
            }
            Some(ChannelMessage::Status(status)) => {
                let reason = match status {
                    ChannelStatus::ChannelError => FailureReason::ChannelError,
                    ChannelStatus::TimedOut => FailureReason::TimedOut,
                    ChannelStatus::Closed | ChannelStatus::Subscribed => FailureReason::Closed,
                };
                self.fail(reason).await;
            }
            Some(ChannelMessage::Change(event)) => {
                self.reconciler.apply_event(&self.user_id, &event).await;
                self.listener.on_event(&event);
            }
        }
    }

    async fn fail(&mut self, reason: FailureReason) {
        self.subscribe_deadline = None;
        self.close_channel().await;
        let transition = self.record_failure(reason);
        self.apply(transition).await;
    }

    fn record_failure(&mut self, reason: FailureReason) -> Transition {
        match self.machine.on_failure(reason) {
            Transition::Escalate => {
                self.publish();
                debug!(user_id = %self.user_id, ?reason, "notification channel failed");
                self.machine.escalate()
            }
            other => other,
        }
    }

    async fn apply(&mut self, transition: Transition) {
        let mut transition = transition;
        loop {
            transition = match transition {
                Transition::Stay | Transition::Escalate => return,
                Transition::Subscribe => match self.open_channel().await {
                    Ok(()) => return,
                    Err(err) => {
                        debug!(user_id = %self.user_id, error = %err, "could not open channel");
                        self.record_failure(FailureReason::OpenFailed)
                    }
                },
                Transition::ScheduleRetry(delay) => {
                    self.retry_at = Some(Instant::now() + delay);
                    return;
                }
                Transition::StartPolling => {
                    warn!(
                        user_id = %self.user_id,
                        "realtime notifications unavailable, polling instead"
                    );
                    let mut interval = tokio::time::interval(self.reconciler.config.poll_interval());
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.poller = Some(interval);
                    return;
                }
                Transition::StopPolling => {
                    self.poller = None;
                    return;
                }
                Transition::Recover(delay) => {
                    self.poller = None;
                    self.retry_at = Some(Instant::now() + delay);
                    return;
                }
            };
        }
    }

    async fn open_channel(&mut self) -> Result<(), AppError> {
        let filter = Filter::new().eq("user_id", self.user_id.to_value());
        let name = format!("notifications:{}", self.user_id);
        let channel = self
            .reconciler
            .realtime
            .open_channel(&name, NOTIFICATIONS_TABLE, &filter)
            .await?;
        self.channel = Some(channel);
        self.subscribe_deadline = Some(Instant::now() + self.reconciler.config.subscribe_timeout());
        Ok(())
    }

    async fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            if let Err(err) = self.reconciler.realtime.remove_channel(&channel.id).await {
                debug!(channel = %channel.id, error = %err, "failed to remove channel");
            }
        }
    }

    async fn poll(&mut self) {
        self.refresh_views(true).await;
        self.listener.on_fallback_tick();
    }

    async fn refresh_views(&self, include_default: bool) {
        let mut views = self.reconciler.cache.loaded_views(&self.user_id).await;
        if views.is_empty() && include_default {
            views.push(NotificationView::All);
        }
        for view in views {
            if let Err(err) = self.reconciler.refresh(&self.user_id, view).await {
                warn!(user_id = %self.user_id, ?view, error = %err, "notification refetch failed");
            }
        }
    }

    async fn shutdown(&mut self) {
        self.subscribe_deadline = None;
        self.retry_at = None;
        self.poller = None;
        self.close_channel().await;
        self.machine.close();
        self.publish();
        debug!(user_id = %self.user_id, "notification subscription closed");
    }
}

async fn next_message(channel: &mut Option<RealtimeChannel>) -> Option<ChannelMessage> {
    match channel {
        Some(channel) => channel.messages.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_tick(poller: &mut Option<Interval>) {
    match poller {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
