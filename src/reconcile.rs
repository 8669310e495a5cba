use crate::events::{EventBus, Topic};
use crate::model::{same_task, TodayTask};
use crate::store::{StoreError, TaskStore};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// The checklist's local view of one day's instances, reconciling optimistic
/// done-flips against the authoritative remote list.
///
/// A toggle flips the local record immediately, marks the position as
/// saving, then re-fetches the remote list and writes it back whole. If the
/// instance vanished remotely in the meantime it is re-appended; on any
/// failure the local flip is reverted. While a position is saving, further
/// toggles on it are ignored (no queueing, no coalescing), which prevents
/// lost updates on a single position. Writes remain last-writer-wins across
/// concurrent flows; see the store contract.
pub struct TodayList {
    store: Arc<dyn TaskStore>,
    bus: EventBus,
    inner: Mutex<Inner>,
}

struct Inner {
    tasks: Vec<TodayTask>,
    saving: HashSet<usize>,
}

impl TodayList {
    pub fn new(store: Arc<dyn TaskStore>, bus: EventBus) -> Self {
        TodayList {
            store,
            bus,
            inner: Mutex::new(Inner {
                tasks: Vec::new(),
                saving: HashSet::new(),
            }),
        }
    }

    /// Reload the view from the store, keeping only instances dated `date`.
    /// Saving marks are reset; the view is brand new.
    pub async fn refresh(&self, date: NaiveDate) -> Result<(), StoreError> {
        let all = self.store.load_today().await?;
        let mut inner = self.inner.lock().unwrap();
        inner.tasks = all.into_iter().filter(|t| t.date == date).collect();
        inner.saving.clear();
        Ok(())
    }

    /// Snapshot of the current local view.
    pub fn tasks(&self) -> Vec<TodayTask> {
        self.inner.lock().unwrap().tasks.clone()
    }

    /// True while a toggle is in flight for the instance at `index`.
    pub fn is_saving(&self, index: usize) -> bool {
        self.inner.lock().unwrap().saving.contains(&index)
    }

    /// Flip the done state of the instance matching `target`.
    ///
    /// No-ops when the instance is not in the local view or a toggle is
    /// already in flight for its position. Failures are absorbed here: the
    /// optimistic flip is reverted and the error logged, never rethrown.
    pub async fn toggle(&self, target: &TodayTask) {
        let (index, flipped) = {
            let mut inner = self.inner.lock().unwrap();
            let Some(index) = inner.tasks.iter().position(|t| same_task(t, target)) else {
                debug!("toggle target not in local view: {:?}", target.title);
                return;
            };
            if inner.saving.contains(&index) {
                debug!("toggle already in flight for {:?}", target.title);
                return;
            }
            let done = inner.tasks[index].is_done();
            inner.tasks[index].set_done(!done);
            inner.saving.insert(index);
            (index, inner.tasks[index].clone())
        };

        let result = self.push_remote(target, &flipped).await;

        let ok = result.is_ok();
        {
            let mut inner = self.inner.lock().unwrap();
            if let Err(err) = result {
                error!("failed to flip done state: {err}");
                if let Some(task) = inner.tasks.get_mut(index) {
                    let done = task.is_done();
                    task.set_done(!done);
                }
            }
            inner.saving.remove(&index);
        }
        if ok {
            self.bus.emit(Topic::TodayChanged);
        }
    }

    /// Reconcile the flipped record against the authoritative remote list.
    /// Absent remotely means deleted or never persisted: append the flipped
    /// instance. Present means replace its done value in place. Either way
    /// the whole section is written back.
    async fn push_remote(&self, target: &TodayTask, flipped: &TodayTask) -> Result<(), StoreError> {
        let mut remote = self.store.load_today().await?;
        match remote.iter().position(|t| same_task(t, target)) {
            Some(index) => remote[index].done = flipped.done.clone(),
            None => remote.push(flipped.clone()),
        }
        self.store.save_today(&remote).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn task(title: &str, day: &str) -> TodayTask {
        TodayTask::new(title.into(), None, date(day))
    }

    async fn list_with(store: Arc<MemoryStore>, day: &str) -> TodayList {
        let list = TodayList::new(store, EventBus::new());
        list.refresh(date(day)).await.unwrap();
        list
    }

    #[tokio::test]
    async fn toggle_flips_local_and_persisted_state() {
        let store = Arc::new(MemoryStore::with_today(vec![task(
            "Water plants 007",
            "2024-01-05",
        )]));
        let list = list_with(store.clone(), "2024-01-05").await;

        list.toggle(&task("Water plants 007", "2024-01-05")).await;

        assert!(list.tasks()[0].is_done());
        assert_eq!(store.today()[0].done, "true");
        assert!(!list.is_saving(0));
    }

    #[tokio::test]
    async fn toggle_matches_by_normalized_identity() {
        let store = Arc::new(MemoryStore::with_today(vec![task(
            "Water Plants 007",
            "2024-01-05",
        )]));
        let list = list_with(store.clone(), "2024-01-05").await;

        list.toggle(&task("  water   plants 007 ", "2024-01-05"))
            .await;
        assert!(store.today()[0].is_done());
    }

    #[tokio::test]
    async fn toggle_of_unknown_instance_is_a_noop() {
        let store = Arc::new(MemoryStore::with_today(vec![task("Known", "2024-01-05")]));
        let list = list_with(store.clone(), "2024-01-05").await;

        list.toggle(&task("Unknown", "2024-01-05")).await;
        assert!(!store.today()[0].is_done());
    }

    #[tokio::test]
    async fn rollback_restores_done_state_when_persist_fails() {
        let store = Arc::new(MemoryStore::with_today(vec![task("Chore", "2024-01-05")]));
        let list = list_with(store.clone(), "2024-01-05").await;
        store.fail_save_today(true);

        list.toggle(&task("Chore", "2024-01-05")).await;

        // Local view reverted, item still visible and interactive again.
        assert!(!list.tasks()[0].is_done());
        assert!(!list.is_saving(0));
        assert!(!store.today()[0].is_done());

        // Clearing the failure makes the next toggle succeed.
        store.fail_save_today(false);
        list.toggle(&task("Chore", "2024-01-05")).await;
        assert!(store.today()[0].is_done());
    }

    #[tokio::test]
    async fn instance_deleted_remotely_is_reappended_flipped() {
        let store = Arc::new(MemoryStore::with_today(vec![task("Chore", "2024-01-05")]));
        let list = list_with(store.clone(), "2024-01-05").await;

        // Remote drifts: the section is emptied behind the view's back.
        store.set_today(Vec::new());

        list.toggle(&task("Chore", "2024-01-05")).await;
        let remote = store.today();
        assert_eq!(remote.len(), 1);
        assert!(remote[0].is_done());
    }

    #[tokio::test]
    async fn second_toggle_on_same_position_is_ignored_while_in_flight() {
        let store = Arc::new(MemoryStore::with_today(vec![task("Chore", "2024-01-05")]));
        store.set_save_delay(Duration::from_millis(50));
        let list = list_with(store.clone(), "2024-01-05").await;

        let target = task("Chore", "2024-01-05");
        tokio::join!(list.toggle(&target), list.toggle(&target));

        // A double flip would land back on false; the guard keeps one flip.
        assert!(list.tasks()[0].is_done());
        assert!(store.today()[0].is_done());
    }

    #[tokio::test]
    async fn success_emits_today_changed() {
        let store = Arc::new(MemoryStore::with_today(vec![task("Chore", "2024-01-05")]));
        let bus = EventBus::new();
        let events = Arc::new(AtomicUsize::new(0));
        {
            let events = events.clone();
            bus.subscribe(Topic::TodayChanged, move || {
                events.fetch_add(1, Ordering::SeqCst);
            });
        }
        let list = TodayList::new(store.clone(), bus);
        list.refresh(date("2024-01-05")).await.unwrap();

        list.toggle(&task("Chore", "2024-01-05")).await;
        assert_eq!(events.load(Ordering::SeqCst), 1);

        store.fail_save_today(true);
        list.toggle(&task("Chore", "2024-01-05")).await;
        assert_eq!(events.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn materialized_instance_round_trips_through_toggle() {
        use crate::model::{Frequency, ScheduledTask};

        let store = Arc::new(MemoryStore::new());
        store.set_scheduled(vec![ScheduledTask {
            id: 7,
            title: "Water plants".into(),
            group: None,
            start: date("2024-01-01"),
            end: None,
            freq: Frequency::Daily,
            selected_days: Vec::new(),
            interval: None,
        }]);
        let bus = EventBus::new();
        crate::scheduler::materialize_today(store.as_ref(), &bus, date("2024-01-05"))
            .await
            .unwrap();

        let materialized = store.today()[0].clone();
        assert_eq!(materialized.title, "Water plants 007");
        assert_eq!(materialized.date, date("2024-01-05"));
        assert_eq!(materialized.done, "false");

        let list = TodayList::new(store.clone(), bus);
        list.refresh(date("2024-01-05")).await.unwrap();
        list.toggle(&materialized).await;

        assert!(list.tasks()[0].is_done());
        assert_eq!(store.today()[0].done, "true");
    }

    #[tokio::test]
    async fn refresh_filters_to_the_requested_date() {
        let store = Arc::new(MemoryStore::with_today(vec![
            task("Today", "2024-01-05"),
            task("Yesterday", "2024-01-04"),
        ]));
        let list = list_with(store, "2024-01-05").await;
        let titles: Vec<_> = list.tasks().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["Today"]);
    }

    #[tokio::test]
    async fn concurrent_writers_are_last_writer_wins() {
        // Accepted limitation: whole-section overwrites mean a slower writer
        // clobbers a faster one. This documents the behavior, it is not a
        // guarantee worth relying on.
        let store = Arc::new(MemoryStore::with_today(vec![task("Chore", "2024-01-05")]));
        let list = list_with(store.clone(), "2024-01-05").await;

        list.toggle(&task("Chore", "2024-01-05")).await;
        assert!(store.today()[0].is_done());

        // A competing flow (deletion, other client) rewrites the section
        // from its own stale snapshot; the toggle's write is gone.
        store.set_today(vec![task("Chore", "2024-01-05")]);
        assert!(!store.today()[0].is_done());
    }
}
