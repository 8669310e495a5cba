use crate::events::{EventBus, Topic};
use crate::model::{same_task, split_tag, TodayTask};
use crate::store::{StoreError, TaskStore};
use tracing::debug;

/// What deleting an instance may mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteChoice {
    /// Remove only this exact instance.
    This,
    /// Remove the schedule definition and this date's derived instances.
    Scheduling,
    /// Remove the schedule definition and every derived instance, any date.
    All,
}

impl DeleteChoice {
    pub fn key(self) -> &'static str {
        match self {
            DeleteChoice::This => "delete-this",
            DeleteChoice::Scheduling => "delete-scheduling",
            DeleteChoice::All => "delete-all",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeleteChoice::This => "Delete This",
            DeleteChoice::Scheduling => "Remove Schedule",
            DeleteChoice::All => "Delete All",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            DeleteChoice::This => "Remove only this instance",
            DeleteChoice::Scheduling => "Stop future occurrences and remove this date",
            DeleteChoice::All => "Remove the schedule and every derived instance",
        }
    }

    pub fn from_key(key: &str) -> Result<Self, DeleteError> {
        match key {
            "delete-this" => Ok(DeleteChoice::This),
            "delete-scheduling" => Ok(DeleteChoice::Scheduling),
            "delete-all" => Ok(DeleteChoice::All),
            other => Err(DeleteError::InvalidChoice(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error("invalid task: empty title")]
    InvalidTask,
    #[error("unrecognized deletion choice: {0}")]
    InvalidChoice(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The deletion choices available for an instance. One-offs (no parseable
/// 3-digit tag, or a literal `000` tag) have no schedule to remove, so the
/// only choice is deleting the instance itself.
pub fn choices_for(task: &TodayTask) -> Vec<DeleteChoice> {
    if task.is_one_off() {
        vec![DeleteChoice::This]
    } else {
        vec![DeleteChoice::This, DeleteChoice::Scheduling, DeleteChoice::All]
    }
}

/// Apply a deletion choice, overwriting the affected section(s) and
/// broadcasting both change notifications on success.
///
/// Errors come back as values; nothing panics or propagates a raw store
/// failure past this boundary. For a one-off instance every choice collapses
/// to removing the exact instance.
pub async fn apply_deletion(
    store: &dyn TaskStore,
    bus: &EventBus,
    task: &TodayTask,
    choice: DeleteChoice,
) -> Result<(), DeleteError> {
    if task.title.trim().is_empty() {
        return Err(DeleteError::InvalidTask);
    }

    let (id, base_title) = split_tag(&task.title);
    let one_off = matches!(id, None | Some(0));

    let todays = store.load_today().await?;
    let scheduled = store.load_scheduled().await?;

    let remove_exact = |tasks: &[TodayTask]| -> Vec<TodayTask> {
        tasks.iter().filter(|t| !same_task(t, task)).cloned().collect()
    };
    let base_and_group_match = |t: &TodayTask| -> bool {
        split_tag(&t.title).1 == base_title && t.group == task.group
    };

    if one_off {
        debug!("deleting one-off instance {:?}", task.title);
        store.save_today(&remove_exact(&todays)).await?;
        bus.emit(Topic::TodayChanged);
        bus.emit(Topic::ScheduledChanged);
        return Ok(());
    }

    let schedule_id = id.unwrap_or(0);
    let remaining_schedules: Vec<_> = scheduled
        .iter()
        .filter(|s| s.id != schedule_id)
        .cloned()
        .collect();

    match choice {
        DeleteChoice::This => {
            store.save_today(&remove_exact(&todays)).await?;
        }
        DeleteChoice::Scheduling => {
            // Stop future generation, and retract instances already
            // materialized for this instance's date. Other dates keep theirs.
            let remaining: Vec<_> = todays
                .iter()
                .filter(|t| !(base_and_group_match(t) && t.date == task.date))
                .cloned()
                .collect();
            store.save_scheduled(&remaining_schedules).await?;
            store.save_today(&remaining).await?;
        }
        DeleteChoice::All => {
            let remaining: Vec<_> = todays
                .iter()
                .filter(|t| !base_and_group_match(t))
                .cloned()
                .collect();
            store.save_today(&remaining).await?;
            store.save_scheduled(&remaining_schedules).await?;
        }
    }

    bus.emit(Topic::TodayChanged);
    bus.emit(Topic::ScheduledChanged);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Frequency, ScheduledTask};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn instance(title: &str, day: &str) -> TodayTask {
        TodayTask::new(title.into(), None, date(day))
    }

    fn definition(id: u32, title: &str) -> ScheduledTask {
        ScheduledTask {
            id,
            title: title.into(),
            group: None,
            start: date("2024-01-01"),
            end: None,
            freq: Frequency::Daily,
            selected_days: Vec::new(),
            interval: None,
        }
    }

    fn store_with(todays: Vec<TodayTask>, scheduled: Vec<ScheduledTask>) -> MemoryStore {
        let store = MemoryStore::with_today(todays);
        store.set_scheduled(scheduled);
        store
    }

    #[test]
    fn one_off_offers_only_delete_this() {
        assert_eq!(
            choices_for(&instance("Call dentist", "2024-01-05")),
            vec![DeleteChoice::This]
        );
        assert_eq!(
            choices_for(&instance("Buy milk 000", "2024-01-05")),
            vec![DeleteChoice::This]
        );
    }

    #[test]
    fn schedule_derived_offers_all_three_choices() {
        assert_eq!(
            choices_for(&instance("Water plants 007", "2024-01-05")).len(),
            3
        );
    }

    #[test]
    fn unknown_choice_key_is_rejected() {
        assert!(matches!(
            DeleteChoice::from_key("delete-everything"),
            Err(DeleteError::InvalidChoice(_))
        ));
        assert_eq!(
            DeleteChoice::from_key("delete-scheduling").unwrap(),
            DeleteChoice::Scheduling
        );
    }

    #[tokio::test]
    async fn empty_title_is_invalid() {
        let store = MemoryStore::new();
        let bus = EventBus::new();
        let err = apply_deletion(
            &store,
            &bus,
            &instance("   ", "2024-01-05"),
            DeleteChoice::This,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DeleteError::InvalidTask));
    }

    #[tokio::test]
    async fn one_off_removed_by_exact_identity_only() {
        let store = store_with(
            vec![
                instance("Call dentist", "2024-01-05"),
                instance("Call dentist", "2024-01-04"),
            ],
            Vec::new(),
        );
        let bus = EventBus::new();
        apply_deletion(
            &store,
            &bus,
            &instance("Call dentist", "2024-01-05"),
            DeleteChoice::This,
        )
        .await
        .unwrap();

        let remaining = store.today();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].date, date("2024-01-04"));
    }

    #[tokio::test]
    async fn delete_this_keeps_the_schedule_definition() {
        let store = store_with(
            vec![instance("Water plants 007", "2024-01-05")],
            vec![definition(7, "Water plants")],
        );
        let bus = EventBus::new();
        apply_deletion(
            &store,
            &bus,
            &instance("Water plants 007", "2024-01-05"),
            DeleteChoice::This,
        )
        .await
        .unwrap();

        assert!(store.today().is_empty());
        assert_eq!(store.scheduled().len(), 1);
    }

    #[tokio::test]
    async fn delete_scheduling_removes_definition_and_same_date_instances() {
        let store = store_with(
            vec![
                instance("Water plants 007", "2024-01-05"),
                instance("Water plants 007", "2024-01-04"),
                instance("Laundry 008", "2024-01-05"),
            ],
            vec![definition(7, "Water plants"), definition(8, "Laundry")],
        );
        let bus = EventBus::new();
        apply_deletion(
            &store,
            &bus,
            &instance("Water plants 007", "2024-01-05"),
            DeleteChoice::Scheduling,
        )
        .await
        .unwrap();

        let titles: Vec<_> = store
            .today()
            .into_iter()
            .map(|t| (t.title, t.date))
            .collect();
        // The other date's instance survives, as does the unrelated task.
        assert_eq!(
            titles,
            vec![
                ("Water plants 007".to_string(), date("2024-01-04")),
                ("Laundry 008".to_string(), date("2024-01-05")),
            ]
        );
        let ids: Vec<_> = store.scheduled().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![8]);
    }

    #[tokio::test]
    async fn delete_all_removes_every_date_for_the_base_title() {
        let store = store_with(
            vec![
                instance("Water plants 007", "2024-01-05"),
                instance("Water plants 007", "2024-01-04"),
                instance("Laundry 008", "2024-01-05"),
            ],
            vec![definition(7, "Water plants"), definition(8, "Laundry")],
        );
        let bus = EventBus::new();
        apply_deletion(
            &store,
            &bus,
            &instance("Water plants 007", "2024-01-05"),
            DeleteChoice::All,
        )
        .await
        .unwrap();

        let titles: Vec<_> = store.today().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["Laundry 008"]);
        let ids: Vec<_> = store.scheduled().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![8]);
    }

    #[tokio::test]
    async fn delete_all_scopes_to_the_matching_group() {
        let mut home = instance("Water plants 007", "2024-01-05");
        home.group = Some("Home".into());
        let office = instance("Water plants 007", "2024-01-05");
        let store = store_with(vec![home.clone(), office], vec![definition(7, "Water plants")]);
        let bus = EventBus::new();
        apply_deletion(&store, &bus, &home, DeleteChoice::All)
            .await
            .unwrap();

        let remaining = store.today();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].group, None);
    }

    #[tokio::test]
    async fn success_broadcasts_both_notifications() {
        let store = store_with(vec![instance("Chore", "2024-01-05")], Vec::new());
        let bus = EventBus::new();
        let today_events = Arc::new(AtomicUsize::new(0));
        let scheduled_events = Arc::new(AtomicUsize::new(0));
        {
            let n = today_events.clone();
            bus.subscribe(Topic::TodayChanged, move || {
                n.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let n = scheduled_events.clone();
            bus.subscribe(Topic::ScheduledChanged, move || {
                n.fetch_add(1, Ordering::SeqCst);
            });
        }
        apply_deletion(
            &store,
            &bus,
            &instance("Chore", "2024-01-05"),
            DeleteChoice::This,
        )
        .await
        .unwrap();
        assert_eq!(today_events.load(Ordering::SeqCst), 1);
        assert_eq!(scheduled_events.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_error_value() {
        let store = store_with(vec![instance("Chore", "2024-01-05")], Vec::new());
        store.fail_save_today(true);
        let bus = EventBus::new();
        let err = apply_deletion(
            &store,
            &bus,
            &instance("Chore", "2024-01-05"),
            DeleteChoice::This,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DeleteError::Store(StoreError::Unavailable(_))));
        assert_eq!(store.today().len(), 1);
    }

    #[tokio::test]
    async fn delete_scheduling_partial_failure_leaves_schedule_removed() {
        // Two sequential overwrites with no transaction: if the second one
        // fails the first has already landed. Accepted last-writer-wins
        // limitation, documented rather than patched.
        let store = store_with(
            vec![instance("Water plants 007", "2024-01-05")],
            vec![definition(7, "Water plants")],
        );
        store.fail_save_today(true);
        let bus = EventBus::new();
        let result = apply_deletion(
            &store,
            &bus,
            &instance("Water plants 007", "2024-01-05"),
            DeleteChoice::Scheduling,
        )
        .await;
        assert!(result.is_err());
        assert!(store.scheduled().is_empty());
        assert_eq!(store.today().len(), 1);
    }
}
