use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// How often a scheduled task recurs.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Once,
    Daily,
    Weekly,
    Monthly,
}

/// A recurrence rule stored in the `scheduledTasks` section.
///
/// Immutable once created; the only mutation is removal through the deletion
/// paths. `interval` is overloaded the way the stored format has it: for
/// `weekly` without selected days it is a repeat-every-N-days cadence
/// anchored at `start`, for `monthly` it is the day of month.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub group: Option<String>,
    pub start: NaiveDate,
    #[serde(default)]
    pub end: Option<NaiveDate>,
    pub freq: Frequency,
    #[serde(default, rename = "selectedDays")]
    pub selected_days: Vec<String>,
    #[serde(default)]
    pub interval: Option<u32>,
}

/// A concrete dated occurrence in the `todaysTasks` section.
///
/// `done` is stored as the literal strings `"true"` / `"false"`, matching the
/// document format; use [`TodayTask::is_done`] and [`TodayTask::set_done`]
/// instead of comparing the field directly.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TodayTask {
    pub title: String,
    #[serde(default)]
    pub group: Option<String>,
    pub date: NaiveDate,
    pub done: String,
}

pub const DONE: &str = "true";
pub const NOT_DONE: &str = "false";

impl TodayTask {
    pub fn new(title: String, group: Option<String>, date: NaiveDate) -> Self {
        TodayTask {
            title,
            group,
            date,
            done: NOT_DONE.to_string(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done == DONE
    }

    pub fn set_done(&mut self, done: bool) {
        self.done = if done { DONE } else { NOT_DONE }.to_string();
    }

    /// Title without the trailing schedule tag, for display.
    pub fn display_title(&self) -> String {
        split_tag(&self.title).1
    }

    /// True when no schedule definition backs this instance.
    pub fn is_one_off(&self) -> bool {
        matches!(split_tag(&self.title).0, None | Some(0))
    }
}

/// Zero-padded 3-digit tag embedded in derived instance titles.
pub fn tag3(id: u32) -> String {
    format!("{:03}", id)
}

/// Derived instance title: base title plus the schedule tag. An empty base
/// keeps just the tag, with no leading separator.
pub fn tagged_title(base: &str, id: u32) -> String {
    let base = base.trim();
    if base.is_empty() {
        tag3(id)
    } else {
        format!("{} {}", base, tag3(id))
    }
}

/// Split an instance title into its schedule id and base title.
///
/// The id is a trailing run of exactly three ASCII digits; anything else
/// (including a tag of `000`) marks the instance as one-off. The base title
/// is the remainder with surrounding whitespace trimmed.
pub fn split_tag(title: &str) -> (Option<u32>, String) {
    let trimmed = title.trim_end();
    if trimmed.len() >= 3 && trimmed.is_char_boundary(trimmed.len() - 3) {
        let (head, tail) = trimmed.split_at(trimmed.len() - 3);
        if tail.chars().all(|c| c.is_ascii_digit()) {
            let id = tail.parse::<u32>().ok();
            return (id, head.trim().to_string());
        }
    }
    (None, title.trim().to_string())
}

/// Normalization applied to titles and groups before identity comparison:
/// trim, casefold, collapse internal whitespace runs to single spaces.
pub fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Bucket key for instances without a category label.
pub const NO_GROUP: &str = "No-group";

/// Instances bucketed by group in first-seen order, real groups before the
/// ungrouped bucket. Shared by the checklist views.
pub fn group_tasks(tasks: &[TodayTask]) -> Vec<(String, Vec<&TodayTask>)> {
    let mut groups: Vec<(String, Vec<&TodayTask>)> = Vec::new();
    for task in tasks {
        let key = task.group.clone().unwrap_or_else(|| NO_GROUP.to_string());
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, bucket)) => bucket.push(task),
            None => groups.push((key, vec![task])),
        }
    }
    let (mut named, ungrouped): (Vec<_>, Vec<_>) =
        groups.into_iter().partition(|(key, _)| key != NO_GROUP);
    named.extend(ungrouped);
    named
}

/// Identity match used to correlate instances across local and remote views.
/// There is no stored instance id; two records are the same logical task when
/// normalized title, normalized group, and date all agree.
pub fn same_task(a: &TodayTask, b: &TodayTask) -> bool {
    normalize(&a.title) == normalize(&b.title)
        && normalize(a.group.as_deref().unwrap_or("")) == normalize(b.group.as_deref().unwrap_or(""))
        && a.date == b.date
}
