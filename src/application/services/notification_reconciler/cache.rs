use crate::domain::entities::{NotificationRecord, NotificationView};
use crate::domain::value_objects::{NotificationId, PrincipalId};
use std::collections::HashMap;
use tokio::sync::RwLock;

type CacheKey = (PrincipalId, NotificationView);

/// キャッシュへの変更単位。どれも何度適用しても結果が変わらない。
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CachePatch {
    Insert(NotificationRecord),
    Update(NotificationRecord),
    Remove(NotificationId),
}

/// 取得開始時点の世代。完了時に一致しなければ結果は捨てる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchTicket {
    key: CacheKey,
    generation: u64,
    epoch: u64,
}

#[derive(Default)]
struct CacheState {
    views: HashMap<CacheKey, Vec<NotificationRecord>>,
    generations: HashMap<CacheKey, u64>,
    // 取得中のビューに届いたパッチ。取得完了時に結果へ当て直す。
    in_flight: HashMap<CacheKey, Vec<CachePatch>>,
    epoch: u64,
}

/// ユーザー × ビュー単位の通知一覧。書き込みはリコンサイラ経由のみ。
#[derive(Default)]
pub struct NotificationCache {
    state: RwLock<CacheState>,
}

impl NotificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(
        &self,
        user_id: &PrincipalId,
        view: NotificationView,
    ) -> Option<Vec<NotificationRecord>> {
        let state = self.state.read().await;
        state.views.get(&(user_id.clone(), view)).cloned()
    }

    /// 読み込み済みのビューから未読数を数える。どちらも無ければ None。
    pub async fn unread_count(&self, user_id: &PrincipalId) -> Option<usize> {
        let state = self.state.read().await;
        if let Some(unread) = state
            .views
            .get(&(user_id.clone(), NotificationView::UnreadOnly))
        {
            return Some(unread.len());
        }
        state
            .views
            .get(&(user_id.clone(), NotificationView::All))
            .map(|all| all.iter().filter(|n| !n.is_read).count())
    }

    pub(crate) async fn loaded_views(&self, user_id: &PrincipalId) -> Vec<NotificationView> {
        let state = self.state.read().await;
        state
            .views
            .keys()
            .filter(|(user, _)| user == user_id)
            .map(|(_, view)| *view)
            .collect()
    }

    pub(crate) async fn begin_fetch(
        &self,
        user_id: &PrincipalId,
        view: NotificationView,
    ) -> FetchTicket {
        let mut state = self.state.write().await;
        let key = (user_id.clone(), view);
        let generation = {
            let generation = state.generations.entry(key.clone()).or_insert(0);
            *generation += 1;
            *generation
        };
        state.in_flight.insert(key.clone(), Vec::new());
        FetchTicket {
            generation,
            epoch: state.epoch,
            key,
        }
    }

    /// 取得結果に取得中のパッチを当て直してビューを置き換え、その内容を返す。
    /// 新しい取得が始まっていた、またはクリアされていた場合は None。
    pub(crate) async fn complete_fetch(
        &self,
        ticket: FetchTicket,
        records: Vec<NotificationRecord>,
    ) -> Option<Vec<NotificationRecord>> {
        let mut state = self.state.write().await;
        let current = state.generations.get(&ticket.key).copied().unwrap_or(0);
        if state.epoch != ticket.epoch || current != ticket.generation {
            return None;
        }
        let (user_id, view) = ticket.key.clone();
        let cached = state.views.get(&ticket.key);
        let mut merged: Vec<NotificationRecord> = records
            .into_iter()
            .filter(|record| record.user_id == user_id)
            .map(|fetched| {
                match cached.and_then(|rows| rows.iter().find(|row| row.id == fetched.id)) {
                    Some(existing) => {
                        let mut record = existing.clone();
                        record.merge(&fetched);
                        record
                    }
                    None => fetched,
                }
            })
            .filter(|record| view.admits(record))
            .collect();
        for patch in state.in_flight.remove(&ticket.key).unwrap_or_default() {
            apply_to_view(view, &mut merged, &patch);
        }
        state.views.insert(ticket.key, merged.clone());
        Some(merged)
    }

    pub(crate) async fn apply(&self, user_id: &PrincipalId, patch: &CachePatch) {
        let mut state = self.state.write().await;
        let state = &mut *state;
        for ((owner, view), records) in state.views.iter_mut() {
            if owner != user_id {
                continue;
            }
            apply_to_view(*view, records, patch);
        }
        for ((owner, _), pending) in state.in_flight.iter_mut() {
            if owner == user_id {
                pending.push(patch.clone());
            }
        }
    }

    pub(crate) async fn clear(&self) {
        let mut state = self.state.write().await;
        state.views.clear();
        state.generations.clear();
        state.in_flight.clear();
        state.epoch += 1;
    }
}

fn apply_to_view(view: NotificationView, records: &mut Vec<NotificationRecord>, patch: &CachePatch) {
    match patch {
        CachePatch::Insert(record) => {
            if records.iter().any(|existing| existing.id == record.id) {
                return;
            }
            if view.admits(record) {
                records.insert(0, record.clone());
            }
        }
        CachePatch::Update(record) => {
            let position = records.iter().position(|existing| existing.id == record.id);
            match (view, position) {
                (NotificationView::UnreadOnly, Some(index)) if record.is_read => {
                    records.remove(index);
                }
                (_, Some(index)) => records[index].merge(record),
                (_, None) => {}
            }
        }
        CachePatch::Remove(id) => records.retain(|existing| &existing.id != id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn user() -> PrincipalId {
        PrincipalId::new("u-1").unwrap()
    }

    fn record(id: &str, is_read: bool) -> NotificationRecord {
        NotificationRecord {
            id: NotificationId::new(id).unwrap(),
            user_id: user(),
            kind: None,
            message: format!("message {id}"),
            is_read,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            metadata: None,
        }
    }

    async fn loaded(cache: &NotificationCache, view: NotificationView, records: Vec<NotificationRecord>) {
        let ticket = cache.begin_fetch(&user(), view).await;
        assert!(cache.complete_fetch(ticket, records).await.is_some());
    }

    #[tokio::test]
    async fn duplicate_insert_is_ignored() {
        let cache = NotificationCache::new();
        loaded(&cache, NotificationView::All, vec![record("1", false)]).await;

        let patch = CachePatch::Insert(record("2", false));
        cache.apply(&user(), &patch).await;
        cache.apply(&user(), &patch).await;

        let all = cache.snapshot(&user(), NotificationView::All).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id.as_str(), "2");
    }

    #[tokio::test]
    async fn read_update_leaves_unread_view_but_patches_all() {
        let cache = NotificationCache::new();
        loaded(&cache, NotificationView::All, vec![record("1", false)]).await;
        loaded(&cache, NotificationView::UnreadOnly, vec![record("1", false)]).await;

        cache
            .apply(&user(), &CachePatch::Update(record("1", true)))
            .await;

        let unread = cache
            .snapshot(&user(), NotificationView::UnreadOnly)
            .await
            .unwrap();
        assert!(unread.is_empty());
        let all = cache.snapshot(&user(), NotificationView::All).await.unwrap();
        assert!(all[0].is_read);
        assert_eq!(cache.unread_count(&user()).await, Some(0));
    }

    #[tokio::test]
    async fn delete_then_late_update_does_not_resurrect() {
        let cache = NotificationCache::new();
        loaded(&cache, NotificationView::All, vec![record("1", false)]).await;

        let id = NotificationId::new("1").unwrap();
        cache.apply(&user(), &CachePatch::Remove(id)).await;
        cache
            .apply(&user(), &CachePatch::Update(record("1", true)))
            .await;
        assert!(cache
            .snapshot(&user(), NotificationView::All)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn superseded_fetch_is_discarded() {
        let cache = NotificationCache::new();
        let first = cache.begin_fetch(&user(), NotificationView::All).await;
        let second = cache.begin_fetch(&user(), NotificationView::All).await;

        assert!(cache
            .complete_fetch(second, vec![record("2", false)])
            .await
            .is_some());
        assert!(cache
            .complete_fetch(first, vec![record("1", false)])
            .await
            .is_none());
        let all = cache.snapshot(&user(), NotificationView::All).await.unwrap();
        assert_eq!(all[0].id.as_str(), "2");
    }

    #[tokio::test]
    async fn fetch_started_before_clear_is_discarded() {
        let cache = NotificationCache::new();
        let ticket = cache.begin_fetch(&user(), NotificationView::All).await;
        cache.clear().await;
        assert!(cache
            .complete_fetch(ticket, vec![record("1", false)])
            .await
            .is_none());
        assert!(cache.snapshot(&user(), NotificationView::All).await.is_none());
    }

    #[tokio::test]
    async fn unloaded_views_are_not_created_by_events() {
        let cache = NotificationCache::new();
        cache
            .apply(&user(), &CachePatch::Insert(record("1", false)))
            .await;
        assert!(cache.snapshot(&user(), NotificationView::All).await.is_none());
        assert_eq!(cache.unread_count(&user()).await, None);
    }

    #[tokio::test]
    async fn events_during_fetch_survive_its_completion() {
        let cache = NotificationCache::new();
        loaded(&cache, NotificationView::All, vec![record("1", false), record("2", false)]).await;

        // サーバー側のスナップショットを取った後に届いたイベント
        let ticket = cache.begin_fetch(&user(), NotificationView::All).await;
        let snapshot = vec![record("1", false), record("2", false)];
        cache
            .apply(&user(), &CachePatch::Insert(record("5", false)))
            .await;
        cache
            .apply(&user(), &CachePatch::Remove(NotificationId::new("2").unwrap()))
            .await;

        let view = cache.complete_fetch(ticket, snapshot).await.unwrap();
        let ids: Vec<_> = view.iter().map(|r| r.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["5", "1"]);
        assert_eq!(
            cache.snapshot(&user(), NotificationView::All).await.unwrap(),
            view
        );
    }

    #[tokio::test]
    async fn stale_fetch_does_not_unread_a_record() {
        let cache = NotificationCache::new();
        loaded(&cache, NotificationView::All, vec![record("1", false)]).await;
        loaded(&cache, NotificationView::UnreadOnly, vec![record("1", false)]).await;

        let all = cache.begin_fetch(&user(), NotificationView::All).await;
        let unread = cache.begin_fetch(&user(), NotificationView::UnreadOnly).await;
        cache
            .apply(&user(), &CachePatch::Update(record("1", true)))
            .await;

        let all = cache.complete_fetch(all, vec![record("1", false)]).await.unwrap();
        assert!(all[0].is_read);
        let unread = cache
            .complete_fetch(unread, vec![record("1", false)])
            .await
            .unwrap();
        assert!(unread.is_empty());
        assert_eq!(cache.unread_count(&user()).await, Some(0));
    }

    #[tokio::test]
    async fn first_fetch_replays_events_for_unloaded_view() {
        let cache = NotificationCache::new();
        let ticket = cache.begin_fetch(&user(), NotificationView::All).await;
        cache
            .apply(&user(), &CachePatch::Insert(record("3", false)))
            .await;
        let view = cache.complete_fetch(ticket, vec![]).await.unwrap();
        assert_eq!(view.len(), 1);
    }
}
