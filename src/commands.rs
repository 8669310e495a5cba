use crate::daily::{self, RunOnceGate};
use crate::delete::{apply_deletion, choices_for, DeleteChoice};
use crate::events::EventBus;
use crate::gist::GistStore;
use crate::model::{group_tasks, same_task, tag3, Frequency, ScheduledTask, TodayTask};
use crate::reconcile::TodayList;
use crate::scheduler::materialize_today;
use crate::storage::{load_state, save_state, state_path, LocalState};
use crate::store::TaskStore;
use crate::ui;
use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use rand::Rng;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

pub async fn login(token: String, gist: Option<String>) -> Result<()> {
    let path = state_path()?;
    let mut state = load_state(&path)?;
    state.token = Some(token.clone());
    if gist.is_some() {
        state.gist_id = gist;
    }
    let store = GistStore::new(token, state.gist_id.clone());
    store
        .ensure_document()
        .await
        .context("verifying remote document")?;
    store
        .ensure_sections()
        .await
        .context("bootstrapping document sections")?;
    state.gist_id = store.gist_id();
    save_state(&path, &state)?;
    println!(
        "Logged in; using document {}",
        state.gist_id.as_deref().unwrap_or("(unknown)")
    );
    Ok(())
}

pub async fn add(title: String, group: Option<String>, date: Option<NaiveDate>) -> Result<()> {
    if title.trim().is_empty() {
        bail!("title must not be empty");
    }
    let (state, _) = load_current_state()?;
    let store = open_store(&state)?;
    let date = date.unwrap_or_else(daily::today);
    store
        .create_today(TodayTask::new(title.clone(), group, date))
        .await
        .context("adding task")?;
    println!("Added {:?} for {}", title, date);
    Ok(())
}

pub async fn schedule(
    title: String,
    freq: String,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    days: Vec<String>,
    interval: Option<u32>,
    group: Option<String>,
) -> Result<()> {
    if title.trim().is_empty() {
        bail!("title must not be empty");
    }
    let freq = parse_freq(&freq)?;
    match freq {
        Frequency::Weekly if days.is_empty() && interval.unwrap_or(0) == 0 => {
            bail!("weekly schedules need --day or a positive --interval")
        }
        Frequency::Monthly => {
            let day = interval.ok_or_else(|| anyhow!("monthly schedules need --interval DAY"))?;
            if !(1..=31).contains(&day) {
                bail!("monthly --interval must be a day of month (1-31)");
            }
        }
        _ => {}
    }

    let (state, _) = load_current_state()?;
    let store = open_store(&state)?;
    let existing = store.load_scheduled().await.context("loading schedules")?;
    let id = generate_schedule_id(&existing)?;
    let definition = ScheduledTask {
        id,
        title: title.clone(),
        group,
        start: start.unwrap_or_else(daily::today),
        end,
        freq,
        selected_days: days,
        interval,
    };
    store
        .create_scheduled(definition)
        .await
        .context("saving schedule")?;
    println!("Scheduled {:?} with tag {}", title, tag3(id));
    Ok(())
}

pub async fn list(date: Option<NaiveDate>, all: bool) -> Result<()> {
    let (state, _) = load_current_state()?;
    let store = open_store(&state)?;
    let mut tasks = store.load_today().await.context("loading tasks")?;
    if !all {
        let date = date.unwrap_or_else(daily::today);
        tasks.retain(|t| t.date == date);
        println!("Tasks for {}", date);
    }
    if tasks.is_empty() {
        println!("(none)");
        return Ok(());
    }
    for (key, bucket) in group_tasks(&tasks) {
        println!("{}", key);
        for task in bucket {
            let mark = if task.is_done() { "x" } else { " " };
            if all {
                println!("  [{}] {}  ({})", mark, task.title, task.date);
            } else {
                println!("  [{}] {}", mark, task.title);
            }
        }
    }
    Ok(())
}

pub async fn schedules() -> Result<()> {
    let (state, _) = load_current_state()?;
    let store = open_store(&state)?;
    let scheduled = store.load_scheduled().await.context("loading schedules")?;
    if scheduled.is_empty() {
        println!("No schedules");
        return Ok(());
    }
    for definition in &scheduled {
        println!("{} {}  {}", tag3(definition.id), definition.title, describe(definition));
        if let Some(group) = &definition.group {
            println!("    group: {}", group);
        }
    }
    Ok(())
}

pub async fn toggle(title: String, date: Option<NaiveDate>, group: Option<String>) -> Result<()> {
    let (state, _) = load_current_state()?;
    let store: Arc<dyn TaskStore> = Arc::new(open_store(&state)?);
    let date = date.unwrap_or_else(daily::today);
    let target = TodayTask::new(title, group, date);

    let list = TodayList::new(store, EventBus::new());
    list.refresh(date).await.context("loading tasks")?;
    let before = list
        .tasks()
        .iter()
        .find(|t| same_task(t, &target))
        .map(|t| t.is_done())
        .ok_or_else(|| anyhow!("no task matching {:?} on {}", target.title, date))?;

    list.toggle(&target).await;

    let after = list
        .tasks()
        .iter()
        .find(|t| same_task(t, &target))
        .map(|t| t.is_done());
    match after {
        Some(done) if done != before => {
            println!("Marked {:?} {}", target.title, if done { "done" } else { "not done" })
        }
        _ => bail!("toggle failed; state unchanged"),
    }
    Ok(())
}

pub async fn delete(
    title: String,
    date: Option<NaiveDate>,
    group: Option<String>,
    choice: Option<String>,
) -> Result<()> {
    let (state, _) = load_current_state()?;
    let store = open_store(&state)?;
    let date = date.unwrap_or_else(daily::today);
    let target = TodayTask::new(title, group, date);

    let Some(key) = choice else {
        println!("Choices for {:?}:", target.title);
        for choice in choices_for(&target) {
            println!("  {}  ({})", choice.key(), choice.label());
        }
        return Ok(());
    };
    let choice = DeleteChoice::from_key(&key)?;
    apply_deletion(&store, &EventBus::new(), &target, choice).await?;
    println!("Deleted {:?} ({})", target.title, choice.key());
    Ok(())
}

pub async fn run(force: bool) -> Result<()> {
    let (state, path) = load_current_state()?;
    let store = open_store(&state)?;
    let bus = EventBus::new();
    let today = daily::today();

    if force {
        store.ensure_sections().await?;
        materialize_today(&store, &bus, today).await?;
        println!("Materialized schedules for {}", today);
        return Ok(());
    }

    let gate = RunOnceGate::new(path);
    let ran = gate
        .run_once_per_day(today, || async {
            store.ensure_sections().await?;
            materialize_today(&store, &bus, today).await?;
            Ok(())
        })
        .await;
    if ran {
        println!("Daily run completed for {}", today);
    } else {
        println!("Already ran today; use --force to materialize again");
    }
    Ok(())
}

pub async fn tui() -> Result<()> {
    let (state, path) = load_current_state()?;
    let store = Arc::new(open_store(&state)?);
    ui::run(store, path).await
}

fn load_current_state() -> Result<(LocalState, PathBuf)> {
    let path = state_path()?;
    let state = load_state(&path)?;
    Ok((state, path))
}

fn open_store(state: &LocalState) -> Result<GistStore> {
    let token = state
        .token
        .clone()
        .ok_or_else(|| anyhow!("no token stored; run `daygist login` first"))?;
    Ok(GistStore::new(token, state.gist_id.clone()))
}

fn parse_freq(raw: &str) -> Result<Frequency> {
    match raw.to_lowercase().as_str() {
        "once" => Ok(Frequency::Once),
        "daily" => Ok(Frequency::Daily),
        "weekly" => Ok(Frequency::Weekly),
        "monthly" => Ok(Frequency::Monthly),
        other => bail!("unknown frequency {:?} (use once|daily|weekly|monthly)", other),
    }
}

/// Fresh schedule id in 1..=999, avoiding ids already in use so the title
/// tag stays exactly three digits and unambiguous.
fn generate_schedule_id(existing: &[ScheduledTask]) -> Result<u32> {
    let used: HashSet<u32> = existing.iter().map(|s| s.id).collect();
    if used.len() >= 999 {
        bail!("all 999 schedule ids are in use");
    }
    let mut rng = rand::thread_rng();
    loop {
        let id = rng.gen_range(1..=999);
        if !used.contains(&id) {
            return Ok(id);
        }
    }
}

fn describe(definition: &ScheduledTask) -> String {
    let core = match definition.freq {
        Frequency::Once => format!("once on {}", definition.start),
        Frequency::Daily => "daily".to_string(),
        Frequency::Weekly if !definition.selected_days.is_empty() => {
            format!("weekly on {}", definition.selected_days.join(", "))
        }
        Frequency::Weekly => format!("every {} days", definition.interval.unwrap_or(0)),
        Frequency::Monthly => format!("monthly on day {}", definition.interval.unwrap_or(0)),
    };
    match definition.end {
        Some(end) => format!("{} ({} to {})", core, definition.start, end),
        None => format!("{} (from {})", core, definition.start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_schedule_id_avoids_existing_ids() {
        let existing: Vec<ScheduledTask> = (1..=998)
            .map(|id| ScheduledTask {
                id,
                title: "t".into(),
                group: None,
                start: "2024-01-01".parse().unwrap(),
                end: None,
                freq: Frequency::Daily,
                selected_days: Vec::new(),
                interval: None,
            })
            .collect();
        let id = generate_schedule_id(&existing).unwrap();
        assert_eq!(id, 999);
    }

    #[test]
    fn parse_freq_accepts_known_values_case_insensitively() {
        assert_eq!(parse_freq("Daily").unwrap(), Frequency::Daily);
        assert_eq!(parse_freq("WEEKLY").unwrap(), Frequency::Weekly);
        assert!(parse_freq("fortnightly").is_err());
    }
}
