// Candidate start enumeration inside already-resolved open intervals.

use chrono::{DateTime, TimeZone, Utc};

use scheduling_cell::models::{ServiceConstraints, TimeInterval};
use scheduling_cell::services::slots;

fn utc(h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, h, mi, 0).unwrap()
}

fn service(duration: i32, buffer_before: i32, buffer_after: i32) -> ServiceConstraints {
    ServiceConstraints {
        duration_minutes: duration,
        buffer_before_minutes: buffer_before,
        buffer_after_minutes: buffer_after,
        ..ServiceConstraints::default()
    }
}

#[test]
fn slots_anchor_at_interval_start_and_stride_over_buffers() {
    let open = vec![TimeInterval::new(utc(9, 0), utc(12, 0))];

    // 50 min session, 10 min either side: stride 70, last fit by 12:00.
    let starts = slots::generate_slots(&open, &service(50, 10, 10), None);

    assert_eq!(starts, vec![utc(9, 0), utc(10, 10)]);
}

#[test]
fn interval_shorter_than_buffered_duration_yields_nothing() {
    let open = vec![TimeInterval::new(utc(9, 0), utc(10, 0))];

    let starts = slots::generate_slots(&open, &service(50, 10, 10), None);

    assert!(starts.is_empty());
}

#[test]
fn interval_exactly_buffered_duration_yields_one_slot() {
    let open = vec![TimeInterval::new(utc(9, 0), utc(10, 10))];

    let starts = slots::generate_slots(&open, &service(50, 10, 10), None);

    assert_eq!(starts, vec![utc(9, 0)]);
}

#[test]
fn finer_step_produces_a_denser_grid() {
    let open = vec![TimeInterval::new(utc(9, 0), utc(12, 0))];

    let starts = slots::generate_slots(&open, &service(50, 10, 10), Some(30));

    assert_eq!(starts, vec![utc(9, 0), utc(9, 50), utc(10, 40)]);
}

#[test]
fn zero_buffers_pack_sessions_back_to_back() {
    let open = vec![TimeInterval::new(utc(9, 0), utc(12, 0))];

    let starts = slots::generate_slots(&open, &service(60, 0, 0), None);

    assert_eq!(starts, vec![utc(9, 0), utc(10, 0), utc(11, 0)]);
}

#[test]
fn intervals_are_enumerated_independently_and_output_sorted() {
    // Out of order on purpose; each piece anchors at its own start and is
    // long enough for two buffered sessions (10:10+50+10 fits by 11:10).
    let open = vec![
        TimeInterval::new(utc(13, 0), utc(15, 10)),
        TimeInterval::new(utc(9, 0), utc(11, 10)),
    ];

    let starts = slots::generate_slots(&open, &service(50, 10, 10), None);

    assert_eq!(starts, vec![utc(9, 0), utc(10, 10), utc(13, 0), utc(14, 10)]);
}

#[test]
fn duplicate_intervals_do_not_duplicate_starts() {
    let interval = TimeInterval::new(utc(9, 0), utc(10, 10));
    let open = vec![interval, interval];

    let starts = slots::generate_slots(&open, &service(50, 10, 10), None);

    assert_eq!(starts, vec![utc(9, 0)]);
}

#[test]
fn nonpositive_duration_or_step_yields_nothing() {
    let open = vec![TimeInterval::new(utc(9, 0), utc(12, 0))];

    assert!(slots::generate_slots(&open, &service(0, 0, 0), None).is_empty());
    assert!(slots::generate_slots(&open, &service(50, 10, 10), Some(0)).is_empty());
}
