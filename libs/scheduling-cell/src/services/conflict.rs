// libs/scheduling-cell/src/services/conflict.rs
//
// Buffer-expanded conflict detection. Buffers are resource-protective, so
// both the candidate's and each existing appointment's buffers are
// respected; comparisons are strict, so expanded intervals that merely
// touch do not conflict.

use crate::models::{CandidateSlot, ExistingAppointment, ServiceConstraints, TimeInterval};

/// Whether committing `candidate` would conflict with the existing
/// non-cancelled appointments of its resources.
///
/// `professional_existing` is the professional's appointment set; a
/// professional cannot run two simultaneous sessions, so its concurrency is
/// always 1 regardless of service configuration. `room_existing`, when a
/// room is involved, carries that room's appointment set and the service's
/// concurrency limit.
pub fn check_candidate(
    candidate: &CandidateSlot,
    constraints: &ServiceConstraints,
    professional_existing: &[ExistingAppointment],
    room_existing: Option<(&[ExistingAppointment], i32)>,
) -> bool {
    let expanded = candidate.expanded_interval(constraints);

    if has_resource_conflict(expanded, professional_existing, 1) {
        return true;
    }

    if let Some((appointments, max_concurrent)) = room_existing {
        if has_resource_conflict(expanded, appointments, max_concurrent.max(1)) {
            return true;
        }
    }

    false
}

/// Conflict test for one resource: with a concurrency limit of 1, any
/// buffer-expanded overlap conflicts; above 1, a conflict is raised only
/// once the number of simultaneously overlapping bookings reaches the
/// limit at some instant inside the candidate's expanded window.
pub fn has_resource_conflict(
    candidate_expanded: TimeInterval,
    existing: &[ExistingAppointment],
    max_concurrent: i32,
) -> bool {
    if max_concurrent <= 1 {
        return existing.iter().any(|appointment| {
            appointment.blocks_new_bookings()
                && appointment.expanded_interval().overlaps(&candidate_expanded)
        });
    }

    peak_overlap(candidate_expanded, existing) >= max_concurrent
}

/// Maximum number of blocking appointments simultaneously overlapping any
/// instant of `window`, after buffer expansion.
fn peak_overlap(window: TimeInterval, existing: &[ExistingAppointment]) -> i32 {
    let mut events: Vec<(chrono::DateTime<chrono::Utc>, i32)> = Vec::new();

    for appointment in existing {
        if !appointment.blocks_new_bookings() {
            continue;
        }
        if let Some(clipped) = appointment.expanded_interval().intersect(&window) {
            events.push((clipped.start, 1));
            events.push((clipped.end, -1));
        }
    }

    // Ends sort before starts at the same instant, so touching intervals
    // never stack.
    events.sort_by_key(|&(at, delta)| (at, delta));

    let mut current = 0;
    let mut peak = 0;
    for (_, delta) in events {
        current += delta;
        peak = peak.max(current);
    }
    peak
}
