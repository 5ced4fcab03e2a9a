//! C10 — Schedule Gate.
//!
//! Per-agent weekly availability window, all times UTC (§4.10). Only gates
//! *new* assignments; a running task is never interrupted by its agent
//! falling out of window.

use chrono::{DateTime, Datelike, NaiveTime, Utc};

use crate::model::DaySchedule;

/// `true` if `now` falls inside `schedule`'s window for its weekday.
/// Overnight windows (`end < start`) match if `now >= start OR now < end`.
/// A day with `is_active = false` or missing `start`/`end` never matches.
pub fn within_window(now: DateTime<Utc>, schedule: &[DaySchedule]) -> bool {
    let weekday = now.weekday().num_days_from_sunday() as u8;
    let Some(day) = schedule.iter().find(|d| d.day_of_week == weekday) else {
        return false;
    };
    if !day.is_active {
        return false;
    }
    let (Some(start), Some(end)) = (day.start, day.end) else {
        return false;
    };
    let now_time = now.time();
    if end < start {
        now_time >= start || now_time < end
    } else {
        now_time >= start && now_time < end
    }
}

/// Implements §4.10's combined gate:
/// ```text
/// eligible = global_scheduling_enabled
///         ? (agent.scheduling_enabled ? within_window(now, schedule) : true)
///         : true
/// ```
pub fn agent_is_eligible_for_new_assignment(
    global_scheduling_enabled: bool,
    agent_scheduling_enabled: bool,
    now: DateTime<Utc>,
    schedule: &[DaySchedule],
) -> bool {
    if !global_scheduling_enabled {
        return true;
    }
    if !agent_scheduling_enabled {
        return true;
    }
    within_window(now, schedule)
}

pub fn day_schedule(day_of_week: u8, start: &str, end: &str, is_active: bool) -> DaySchedule {
    DaySchedule {
        day_of_week,
        start: NaiveTime::parse_from_str(start, "%H:%M").ok(),
        end: NaiveTime::parse_from_str(end, "%H:%M").ok(),
        is_active,
    }
}
