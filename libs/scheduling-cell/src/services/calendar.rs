// libs/scheduling-cell/src/services/calendar.rs
//
// Resource calendar resolution: project a weekly template and its exclusion
// windows onto a concrete date, in the resource's configured timezone.
// Everything here is a pure function of its inputs.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Utc};

use crate::models::{ExclusionWindow, TimeInterval, WeeklyTemplate};

/// Convert a resource-local wall-clock time to a UTC instant. Fixed offsets
/// are never ambiguous, so this is total.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: FixedOffset) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_time(time) - tz, Utc)
}

/// The UTC span covered by a resource-local calendar day.
pub fn day_bounds(date: NaiveDate, tz: FixedOffset) -> TimeInterval {
    let next = date.succ_opt().unwrap_or(NaiveDate::MAX);
    TimeInterval::new(
        local_to_utc(date, NaiveTime::MIN, tz),
        local_to_utc(next, NaiveTime::MIN, tz),
    )
}

/// Resolve a resource's open intervals on `date`: the weekly template entry
/// for that day-of-week, minus every exclusion window that applies. Returns
/// zero, one, or multiple disjoint intervals sorted ascending; empty means
/// fully closed.
pub fn resolve_open_intervals(
    template: &WeeklyTemplate,
    exclusions: &[ExclusionWindow],
    date: NaiveDate,
    tz: FixedOffset,
) -> Vec<TimeInterval> {
    let day_of_week = date.weekday().num_days_from_sunday() as u8;

    let entry = match template.entry_for(day_of_week) {
        Some(entry) if entry.is_open => entry,
        _ => return vec![],
    };

    let mut open = vec![TimeInterval::new(
        local_to_utc(date, entry.start_time, tz),
        local_to_utc(date, entry.end_time, tz),
    )];

    for window in exclusions.iter().filter(|w| w.applies_on(date)) {
        let excluded = exclusion_interval_on(window, date, tz);
        open = open
            .iter()
            .flat_map(|interval| interval.subtract(&excluded))
            .collect();
        if open.is_empty() {
            break;
        }
    }

    open.sort_by_key(|interval| interval.start);
    open
}

/// Intersect two disjoint interval sets: every overlapping pair contributes
/// its overlap.
pub fn intersect_sets(a: &[TimeInterval], b: &[TimeInterval]) -> Vec<TimeInterval> {
    let mut out: Vec<TimeInterval> = a
        .iter()
        .flat_map(|x| b.iter().filter_map(move |y| x.intersect(y)))
        .collect();
    out.sort_by_key(|interval| interval.start);
    out
}

/// The UTC span an exclusion window closes on the given date. All-day when
/// the window carries no times; otherwise the window's times apply on every
/// covered date.
fn exclusion_interval_on(window: &ExclusionWindow, date: NaiveDate, tz: FixedOffset) -> TimeInterval {
    let start = local_to_utc(date, window.start_time.unwrap_or(NaiveTime::MIN), tz);
    let end = match window.end_time {
        Some(time) => local_to_utc(date, time, tz),
        None => local_to_utc(date.succ_opt().unwrap_or(NaiveDate::MAX), NaiveTime::MIN, tz),
    };
    TimeInterval::new(start, end)
}
