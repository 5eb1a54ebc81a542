//! Due-time evaluation.
//!
//! Pure function of a schedule and a wall-clock instant, so every rule
//! is testable without a clock. Field semantics:
//!
//! * `fixed_time` overrides everything: when set, the schedule is due
//!   exactly when the current `HH:MM` matches, whatever the other
//!   fields say.
//! * `weekdays` and `month_days` are filters; both must pass (empty
//!   means no constraint).
//! * A window (`window_start`..=`window_end`, inclusive) with an
//!   interval fires on the interval grid anchored at the window start.
//!   A window without an interval never fires on its own.
//! * An interval without a window fires whenever the minute of the
//!   hour is divisible by it.
//! * A schedule with no temporal fields at all is due on every pass.

use chrono::{Datelike, NaiveDateTime, Timelike};

use pipeflow_store::Schedule;

/// Weekday tokens by ISO weekday number (Monday = 1).
const WEEKDAY_TOKENS: [&str; 7] = ["seg", "ter", "qua", "qui", "sex", "sab", "dom"];

pub fn is_due(schedule: &Schedule, now: NaiveDateTime) -> bool {
    if let Some(fixed) = &schedule.fixed_time {
        return now.format("%H:%M").to_string() == *fixed;
    }

    if !schedule.weekdays.is_empty() {
        let token = WEEKDAY_TOKENS[now.weekday().number_from_monday() as usize - 1];
        if !schedule.weekdays.iter().any(|d| d == token) {
            return false;
        }
    }

    if !schedule.month_days.is_empty() {
        let today = now.day().to_string();
        if !schedule.month_days.iter().any(|d| d == &today) {
            return false;
        }
    }

    let now_minutes = now.hour() * 60 + now.minute();

    match (&schedule.window_start, &schedule.window_end) {
        (Some(start), Some(end)) => {
            let (start, end) = match (parse_hm(start), parse_hm(end)) {
                (Some(s), Some(e)) => (s, e),
                _ => return false,
            };
            if now_minutes < start || now_minutes > end {
                return false;
            }
            if schedule.interval_minutes == 0 {
                return false;
            }
            (now_minutes - start) % schedule.interval_minutes == 0
        }
        _ => {
            if schedule.interval_minutes > 0 {
                now.minute() % schedule.interval_minutes == 0
            } else {
                true
            }
        }
    }
}

/// `HH:MM` to minutes since midnight. `None` on malformed input, which
/// the caller treats as "window never matches".
fn parse_hm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}
