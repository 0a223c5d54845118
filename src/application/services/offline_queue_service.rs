use crate::application::ports::offline_queue_store::OfflineQueueStore;
use crate::application::ports::row_store::RowStore;
use crate::domain::entities::{AttendanceMark, AttendanceWriteOutcome, DrainReport};
use crate::shared::error::AppError;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const ATTENDANCE_TABLE: &str = "attendance";
const ATTENDANCE_CONFLICT_TARGET: &str = "student_id,class_date";

/// 端末の接続状態。UI 側から online / offline を流し込む。
pub struct ConnectivityMonitor {
    sender: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (sender, _) = watch::channel(initially_online);
        Self { sender }
    }

    pub fn set_online(&self, online: bool) {
        self.sender.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// 画面の「オフライン / 同期中」表示用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncIndicator {
    pub online: bool,
    pub pending: usize,
}

impl SyncIndicator {
    pub fn label(&self) -> Option<&'static str> {
        if !self.online {
            Some("Offline")
        } else if self.pending > 0 {
            Some("Syncing")
        } else {
            None
        }
    }
}

pub struct OfflineQueueService {
    store: Arc<dyn OfflineQueueStore>,
    rows: Arc<dyn RowStore>,
    connectivity: watch::Receiver<bool>,
    drain_gate: Mutex<()>,
}

impl OfflineQueueService {
    pub fn new(
        store: Arc<dyn OfflineQueueStore>,
        rows: Arc<dyn RowStore>,
        connectivity: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            rows,
            connectivity,
            drain_gate: Mutex::new(()),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// 失敗しても呼び出し側には返さない。失われた書き込みはログにだけ残る。
    pub async fn enqueue(&self, mark: AttendanceMark) {
        match self.store.append(&mark, Utc::now()).await {
            Ok(seq) => debug!(
                seq,
                student_id = %mark.student_id,
                class_date = %mark.class_date,
                "attendance queued offline"
            ),
            Err(err) => error!(
                student_id = %mark.student_id,
                class_date = %mark.class_date,
                error = %err,
                "attendance write lost: offline queue unavailable"
            ),
        }
    }

    /// オンラインなら直接書き、オフラインか一時的な失敗ならキューに回す。
    pub async fn record_attendance(
        &self,
        mark: AttendanceMark,
    ) -> Result<AttendanceWriteOutcome, AppError> {
        if !self.is_online() {
            self.enqueue(mark).await;
            return Ok(AttendanceWriteOutcome::Queued);
        }
        match self
            .rows
            .upsert(ATTENDANCE_TABLE, mark.to_row(), ATTENDANCE_CONFLICT_TARGET)
            .await
        {
            Ok(_) => Ok(AttendanceWriteOutcome::Written),
            Err(err) if err.is_retryable() => {
                debug!(error = %err, "attendance write failed transiently, queueing");
                self.enqueue(mark).await;
                Ok(AttendanceWriteOutcome::Queued)
            }
            Err(err) => Err(err),
        }
    }

    /// 先頭から順に再送し、最初の失敗で止める。失敗分以降は順序を保って残る。
    pub async fn drain(&self) -> Result<DrainReport, AppError> {
        let _gate = self.drain_gate.lock().await;
        let entries = self.store.list().await?;
        let total = entries.len();
        let mut replayed = 0;

        for entry in entries {
            let outcome = self
                .rows
                .upsert(
                    ATTENDANCE_TABLE,
                    entry.mark.to_row(),
                    ATTENDANCE_CONFLICT_TARGET,
                )
                .await;
            if let Err(err) = outcome {
                warn!(
                    seq = entry.seq,
                    replayed,
                    remaining = total - replayed,
                    error = %err,
                    "offline replay stopped"
                );
                return Ok(DrainReport {
                    replayed,
                    remaining: total - replayed,
                });
            }
            self.store.remove(entry.seq).await?;
            replayed += 1;
        }

        if total > 0 {
            info!(replayed, "offline attendance queue drained");
        }
        Ok(DrainReport {
            replayed,
            remaining: 0,
        })
    }

    pub async fn pending_count(&self) -> Result<usize, AppError> {
        self.store.len().await
    }

    pub async fn sync_indicator(&self) -> SyncIndicator {
        let pending = match self.store.len().await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "could not read offline queue size");
                0
            }
        };
        SyncIndicator {
            online: self.is_online(),
            pending,
        }
    }

    /// offline → online の変化ごとにキューを流す。起動時にオンラインならまず一度流す。
    pub fn spawn_reconnect_drain(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let mut connectivity = self.connectivity.clone();
        tokio::spawn(async move {
            let mut was_online = *connectivity.borrow_and_update();
            if was_online {
                service.drain_logged().await;
            }
            while connectivity.changed().await.is_ok() {
                let online = *connectivity.borrow_and_update();
                if online && !was_online {
                    service.drain_logged().await;
                }
                was_online = online;
            }
            debug!("connectivity watcher stopped");
        })
    }

    async fn drain_logged(&self) {
        match self.drain().await {
            Ok(report) if !report.is_complete() => {
                debug!(remaining = report.remaining, "offline queue left for next reconnect")
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "offline queue drain failed"),
        }
    }
}
