// libs/scheduling-cell/src/services/constraints.rs
//
// Per-service booking rule evaluation. `now` and the resource timezone are
// always explicit inputs; nothing here reads the system clock.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{RejectionReason, Resource, ResourceKind, ServiceConstraints, ServiceMode};
use crate::services::calendar;

/// Check whether a start time is bookable for the service with the given
/// professional/room pairing. Checks run in order and the first failure
/// short-circuits.
pub fn evaluate(
    constraints: &ServiceConstraints,
    professional_id: Uuid,
    room: Option<&Resource>,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> Result<(), RejectionReason> {
    check_eligibility(constraints, professional_id, room)?;

    let advance = start - now;
    if advance < Duration::hours(constraints.min_advance_booking_hours as i64) {
        return Err(RejectionReason::TooSoon);
    }
    if advance > Duration::days(constraints.max_advance_booking_days as i64) {
        return Err(RejectionReason::TooFar);
    }

    if !constraints.allow_same_day_booking
        && start.with_timezone(&tz).date_naive() == now.with_timezone(&tz).date_naive()
    {
        return Err(RejectionReason::SameDayDisallowed);
    }

    Ok(())
}

/// Whole-day short-circuit used before slot generation: if no instant of
/// `date` can pass `evaluate`, report why so the day is skipped entirely.
pub fn evaluate_day(
    constraints: &ServiceConstraints,
    professional_id: Uuid,
    room: Option<&Resource>,
    date: NaiveDate,
    now: DateTime<Utc>,
    tz: FixedOffset,
) -> Option<RejectionReason> {
    if let Err(reason) = check_eligibility(constraints, professional_id, room) {
        return Some(reason);
    }

    let bounds = calendar::day_bounds(date, tz);

    // Even the last instant of the day would violate the minimum notice.
    if bounds.end - now <= Duration::hours(constraints.min_advance_booking_hours as i64) {
        return Some(RejectionReason::TooSoon);
    }
    if bounds.start - now > Duration::days(constraints.max_advance_booking_days as i64) {
        return Some(RejectionReason::TooFar);
    }
    if !constraints.allow_same_day_booking && date == now.with_timezone(&tz).date_naive() {
        return Some(RejectionReason::SameDayDisallowed);
    }

    None
}

fn check_eligibility(
    constraints: &ServiceConstraints,
    professional_id: Uuid,
    room: Option<&Resource>,
) -> Result<(), RejectionReason> {
    if !constraints.professional_eligible(professional_id) {
        return Err(RejectionReason::IneligibleResource);
    }

    match room {
        Some(room) => {
            if room.kind != ResourceKind::Room
                || !room.is_bookable
                || !constraints.room_eligible(room.id)
                || room.room_type != Some(constraints.mode.compatible_room_type())
            {
                return Err(RejectionReason::IneligibleResource);
            }
        }
        // Only online services may run without a room record.
        None => {
            if constraints.mode == ServiceMode::InPerson {
                return Err(RejectionReason::IneligibleResource);
            }
        }
    }

    Ok(())
}
