use crate::model::{Frequency, ScheduledTask};
use chrono::{Datelike, NaiveDate};

/// Decide whether `schedule` produces an instance on `date`.
///
/// Pure and total: no I/O, no clock, and malformed rules (a weekly schedule
/// with neither selected days nor a positive interval) simply never occur.
/// All comparisons are calendar-day granular; callers pass a plain date, so
/// time-of-day can never leak into the decision.
pub fn occurs_on(schedule: &ScheduledTask, date: NaiveDate) -> bool {
    if schedule.freq == Frequency::Once {
        return date == schedule.start;
    }

    if date < schedule.start {
        return false;
    }
    if let Some(end) = schedule.end {
        if date > end {
            return false;
        }
    }

    match schedule.freq {
        Frequency::Once => unreachable!("handled above"),
        Frequency::Daily => true,
        Frequency::Weekly => {
            if !schedule.selected_days.is_empty() {
                let today = weekday_abbrev(date);
                schedule
                    .selected_days
                    .iter()
                    .any(|d| normalize_day(d) == today)
            } else if let Some(interval) = schedule.interval.filter(|&n| n > 0) {
                let diff = (date - schedule.start).num_days();
                diff >= 0 && diff % i64::from(interval) == 0
            } else {
                false
            }
        }
        // Day-of-month match. A day with no counterpart in the current month
        // (e.g. 31 in April) never fires that month; no clamping or rollover.
        Frequency::Monthly => schedule.interval == Some(date.day()),
    }
}

/// Locale-independent 3-letter weekday name for `date` ("Mon".."Sun").
pub fn weekday_abbrev(date: NaiveDate) -> String {
    date.format("%a").to_string()
}

/// Fold a user-entered day name to the canonical 3-letter form: first
/// character uppercased, next two lowercased ("monday" -> "Mon").
fn normalize_day(day: &str) -> String {
    let mut out = String::with_capacity(3);
    for (i, c) in day.chars().take(3).enumerate() {
        if i == 0 {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}
