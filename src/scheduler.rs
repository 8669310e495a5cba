use crate::events::{EventBus, Topic};
use crate::model::{tagged_title, TodayTask};
use crate::recurrence::occurs_on;
use crate::store::{StoreError, TaskStore};
use chrono::NaiveDate;
use tracing::{debug, error};

/// Materialize today's instances from the scheduled section.
///
/// Every definition that occurs on `today` gets a derived instance appended
/// to the today section, unconditionally: the store is append-only within a
/// run, and the run-once gate is the sole duplicate-prevention mechanism.
/// A failed append is logged and skipped; it never aborts the remaining
/// schedules. Only a failure to load the definitions themselves is returned.
pub async fn materialize_today(
    store: &dyn TaskStore,
    bus: &EventBus,
    today: NaiveDate,
) -> Result<(), StoreError> {
    let scheduled = store.load_scheduled().await?;
    if scheduled.is_empty() {
        return Ok(());
    }

    for schedule in &scheduled {
        if !occurs_on(schedule, today) {
            continue;
        }
        let instance = TodayTask::new(
            tagged_title(&schedule.title, schedule.id),
            schedule.group.clone(),
            today,
        );
        debug!("materializing {:?} for {today}", instance.title);
        match store.create_today(instance).await {
            Ok(()) => bus.emit(Topic::TodayChanged),
            Err(err) => error!("error creating today task for {:?}: {err}", schedule.title),
        }
    }
    Ok(())
}
