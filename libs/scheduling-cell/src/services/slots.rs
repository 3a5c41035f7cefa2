// libs/scheduling-cell/src/services/slots.rs

use chrono::{DateTime, Duration, Utc};

use crate::models::{ServiceConstraints, TimeInterval};

/// Enumerate candidate start times within already-resolved open intervals.
///
/// The first candidate anchors at the interval start (there is nothing
/// earlier for a buffer to protect); successive candidates advance by
/// `step + buffer_before + buffer_after`, so a booking in each slot leaves
/// room for both adjacent buffers. `step` defaults to the service duration;
/// callers may pass a finer grid to support back-to-back services of
/// different durations.
///
/// A candidate fits only while `start + duration + buffer_after` stays
/// within the interval, and an interval shorter than
/// `buffer_before + duration + buffer_after` yields no slots at all.
/// Output is deduplicated and sorted ascending.
pub fn generate_slots(
    open_intervals: &[TimeInterval],
    constraints: &ServiceConstraints,
    step_minutes: Option<i32>,
) -> Vec<DateTime<Utc>> {
    let step = step_minutes.unwrap_or(constraints.duration_minutes);
    if step <= 0 || constraints.duration_minutes <= 0 {
        return vec![];
    }

    let duration = constraints.duration();
    let buffer_before = constraints.buffer_before();
    let buffer_after = constraints.buffer_after();
    let stride = Duration::minutes(step as i64) + buffer_before + buffer_after;
    let min_interval_len = buffer_before + duration + buffer_after;

    let mut starts = Vec::new();
    for interval in open_intervals {
        if interval.duration() < min_interval_len {
            continue;
        }

        let mut start = interval.start;
        while start + duration + buffer_after <= interval.end {
            starts.push(start);
            start += stride;
        }
    }

    starts.sort();
    starts.dedup();
    starts
}
