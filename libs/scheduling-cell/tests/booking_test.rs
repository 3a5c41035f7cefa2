// End-to-end engine tests against the in-memory store: slot search, the
// booking path, and the no-double-booking guarantee under concurrency.

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use scheduling_cell::models::{
    AppointmentStatus, BookingOutcome, CandidateSlot, DateRange, ExclusionWindow,
    RejectionReason, Resource, ResourceKind, RoomType, SchedulingError, ServiceConstraints,
    ServiceMode, TemplateEntry, WeeklyTemplate,
};
use scheduling_cell::stores::{InMemoryStore, ResourceDirectory};
use scheduling_cell::SchedulingEngine;

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn date(y: i32, mo: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, mo, d).unwrap()
}

fn open_all_week(resource_id: Uuid, kind: ResourceKind, start: (u32, u32), end: (u32, u32)) -> WeeklyTemplate {
    WeeklyTemplate {
        resource_id,
        resource_kind: kind,
        entries: (0..7)
            .map(|day_of_week| TemplateEntry {
                day_of_week,
                start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
                is_open: true,
            })
            .collect(),
    }
}

fn professional(id: Uuid) -> Resource {
    Resource {
        id,
        kind: ResourceKind::Professional,
        name: "Dr. Vega".to_string(),
        room_type: None,
        utc_offset_minutes: 0,
        is_bookable: true,
    }
}

/// Store seeded with one professional open 08:00-18:00 every day and one
/// online service with the default 50/10/10 shape.
async fn seeded_store() -> (Arc<InMemoryStore>, Uuid, Uuid) {
    let store = Arc::new(InMemoryStore::new());
    let professional_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();

    store.upsert_resource(professional(professional_id)).await;
    store
        .set_weekly_template(open_all_week(
            professional_id,
            ResourceKind::Professional,
            (8, 0),
            (18, 0),
        ))
        .await;
    store
        .upsert_service_constraints(ServiceConstraints {
            service_id,
            mode: ServiceMode::Online,
            ..ServiceConstraints::default()
        })
        .await;

    (store, professional_id, service_id)
}

fn engine_for(store: &Arc<InMemoryStore>) -> SchedulingEngine {
    SchedulingEngine::new(store.clone(), store.clone())
}

#[tokio::test]
async fn find_slots_enumerates_the_open_day() {
    let (store, professional_id, service_id) = seeded_store().await;
    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);

    let slots = engine
        .find_slots(service_id, professional_id, None, DateRange::single(date(2025, 3, 4)), now)
        .await
        .unwrap();

    assert!(!slots.is_empty());
    assert_eq!(slots[0].start, utc(2025, 3, 4, 8, 0));
    assert!(slots.windows(2).all(|pair| pair[0].start < pair[1].start));
    for slot in &slots {
        assert_eq!(slot.end - slot.start, Duration::minutes(50));
        assert_eq!(slot.room_id, None);
    }
}

#[tokio::test]
async fn find_slots_is_idempotent_against_an_unchanged_store() {
    let (store, professional_id, service_id) = seeded_store().await;
    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);
    let range = DateRange::new(date(2025, 3, 4), date(2025, 3, 6));

    let first = engine
        .find_slots(service_id, professional_id, None, range, now)
        .await
        .unwrap();
    let second = engine
        .find_slots(service_id, professional_id, None, range, now)
        .await
        .unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn find_slots_excludes_committed_bookings() {
    let (store, professional_id, service_id) = seeded_store().await;
    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);
    let service = store.get_service_constraints(service_id).await.unwrap();

    // 08:30-09:20 with 10-minute buffers blocks 08:20-09:30; both the
    // 08:00 and 09:10 grid starts expand into that window.
    store
        .insert_appointment(
            &CandidateSlot {
                professional_id,
                room_id: None,
                service_id,
                start: utc(2025, 3, 4, 8, 30),
                end: utc(2025, 3, 4, 9, 20),
            },
            &service,
            AppointmentStatus::Scheduled,
        )
        .await;

    let slots = engine
        .find_slots(service_id, professional_id, None, DateRange::single(date(2025, 3, 4)), now)
        .await
        .unwrap();

    assert!(!slots.is_empty());
    assert!(slots.iter().all(|slot| slot.start != utc(2025, 3, 4, 8, 0)));
    assert!(slots.iter().all(|slot| slot.start != utc(2025, 3, 4, 9, 10)));
    assert_eq!(slots[0].start, utc(2025, 3, 4, 10, 20));
}

#[tokio::test]
async fn conflict_alternatives_are_themselves_bookable() {
    let (store, professional_id, service_id) = seeded_store().await;
    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);

    let slots = engine
        .find_slots(service_id, professional_id, None, DateRange::single(date(2025, 3, 4)), now)
        .await
        .unwrap();
    let candidate = slots[0].clone();

    let first = engine
        .book(candidate.clone(), now, CancellationToken::new())
        .await
        .unwrap();
    assert!(first.is_reserved());

    let second = engine
        .book(candidate, now, CancellationToken::new())
        .await
        .unwrap();
    let alternatives = match second {
        BookingOutcome::Rejected { reason: RejectionReason::Conflict, alternatives } => alternatives,
        other => panic!("expected conflict rejection, got {:?}", other),
    };
    assert!(!alternatives.is_empty());

    let retried = engine
        .book(alternatives[0].clone(), now, CancellationToken::new())
        .await
        .unwrap();

    assert!(retried.is_reserved());
    assert_eq!(store.appointment_count().await, 2);
}

#[tokio::test]
async fn booking_a_generated_slot_reserves_it() {
    let (store, professional_id, service_id) = seeded_store().await;
    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);

    let slots = engine
        .find_slots(service_id, professional_id, None, DateRange::single(date(2025, 3, 4)), now)
        .await
        .unwrap();

    let outcome = engine
        .book(slots[0].clone(), now, CancellationToken::new())
        .await
        .unwrap();

    let reservation = match outcome {
        BookingOutcome::Reserved(reservation) => reservation,
        other => panic!("expected reservation, got {:?}", other),
    };
    assert_eq!(reservation.start, slots[0].start);
    assert_eq!(reservation.status, AppointmentStatus::Scheduled);
    assert!(reservation.version >= 1);
    assert_eq!(store.appointment_count().await, 1);
}

#[tokio::test]
async fn rebooking_the_same_slot_is_a_conflict_with_alternatives() {
    let (store, professional_id, service_id) = seeded_store().await;
    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);

    let slots = engine
        .find_slots(service_id, professional_id, None, DateRange::single(date(2025, 3, 4)), now)
        .await
        .unwrap();
    let candidate = slots[0].clone();

    let first = engine
        .book(candidate.clone(), now, CancellationToken::new())
        .await
        .unwrap();
    assert!(first.is_reserved());

    let second = engine
        .book(candidate.clone(), now, CancellationToken::new())
        .await
        .unwrap();

    match second {
        BookingOutcome::Rejected { reason, alternatives } => {
            assert_eq!(reason, RejectionReason::Conflict);
            assert!(!alternatives.is_empty());
            assert!(alternatives.iter().all(|slot| slot.start != candidate.start));
        }
        other => panic!("expected conflict rejection, got {:?}", other),
    }
    assert_eq!(store.appointment_count().await, 1);
}

#[tokio::test]
async fn concurrent_attempts_on_one_slot_reserve_exactly_once() {
    let (store, professional_id, service_id) = seeded_store().await;
    let engine = Arc::new(engine_for(&store));
    let now = utc(2025, 3, 3, 8, 0);

    let slots = engine
        .find_slots(service_id, professional_id, None, DateRange::single(date(2025, 3, 4)), now)
        .await
        .unwrap();
    let candidate = slots[0].clone();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        let candidate = candidate.clone();
        handles.push(tokio::spawn(async move {
            engine.book(candidate, now, CancellationToken::new()).await
        }));
    }

    let mut reserved = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_reserved() {
            reserved += 1;
        }
    }

    assert_eq!(reserved, 1);
    assert_eq!(store.appointment_count().await, 1);
}

#[tokio::test]
async fn a_cancelled_attempt_writes_nothing() {
    let (store, professional_id, service_id) = seeded_store().await;
    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);

    let slots = engine
        .find_slots(service_id, professional_id, None, DateRange::single(date(2025, 3, 4)), now)
        .await
        .unwrap();

    let token = CancellationToken::new();
    token.cancel();

    let outcome = engine.book(slots[0].clone(), now, token).await.unwrap();

    assert_matches!(
        outcome,
        BookingOutcome::Rejected { reason: RejectionReason::Cancelled, .. }
    );
    assert_eq!(store.appointment_count().await, 0);
}

#[tokio::test]
async fn cancelling_an_appointment_frees_its_slot_immediately() {
    let (store, professional_id, service_id) = seeded_store().await;
    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);
    let service = store.get_service_constraints(service_id).await.unwrap();

    let candidate = CandidateSlot {
        professional_id,
        room_id: None,
        service_id,
        start: utc(2025, 3, 4, 9, 10),
        end: utc(2025, 3, 4, 10, 0),
    };
    let blocking = store
        .insert_appointment(&candidate, &service, AppointmentStatus::Scheduled)
        .await;

    let while_blocked = engine
        .book(candidate.clone(), now, CancellationToken::new())
        .await
        .unwrap();
    assert_matches!(
        while_blocked,
        BookingOutcome::Rejected { reason: RejectionReason::Conflict, .. }
    );

    assert!(store.set_appointment_status(blocking, AppointmentStatus::Cancelled).await);

    let after_cancel = engine
        .book(candidate, now, CancellationToken::new())
        .await
        .unwrap();
    assert!(after_cancel.is_reserved());
}

#[tokio::test]
async fn an_exclusion_added_after_the_search_rejects_the_stale_candidate() {
    let (store, professional_id, service_id) = seeded_store().await;
    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);

    let slots = engine
        .find_slots(service_id, professional_id, None, DateRange::single(date(2025, 3, 4)), now)
        .await
        .unwrap();

    store
        .add_exclusion_window(
            professional_id,
            ResourceKind::Professional,
            ExclusionWindow {
                start_date: date(2025, 3, 4),
                end_date: date(2025, 3, 4),
                start_time: None,
                end_time: None,
                reason: Some("sick leave".to_string()),
                recurring: false,
            },
        )
        .await;

    let outcome = engine
        .book(slots[0].clone(), now, CancellationToken::new())
        .await
        .unwrap();

    assert_matches!(
        outcome,
        BookingOutcome::Rejected { reason: RejectionReason::ResourceClosed, .. }
    );
    assert_eq!(store.appointment_count().await, 0);
}

#[tokio::test]
async fn a_candidate_with_the_wrong_duration_is_a_validation_error() {
    let (store, professional_id, service_id) = seeded_store().await;
    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);

    let candidate = CandidateSlot {
        professional_id,
        room_id: None,
        service_id,
        start: utc(2025, 3, 4, 9, 0),
        end: utc(2025, 3, 4, 9, 30),
    };

    let result = engine.book(candidate, now, CancellationToken::new()).await;

    assert_matches!(result, Err(SchedulingError::Validation(_)));
}

#[tokio::test]
async fn a_candidate_inside_minimum_notice_is_rejected_at_booking() {
    let (store, professional_id, service_id) = seeded_store().await;
    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);

    let candidate = CandidateSlot {
        professional_id,
        room_id: None,
        service_id,
        start: utc(2025, 3, 3, 9, 0),
        end: utc(2025, 3, 3, 9, 50),
    };

    let outcome = engine.book(candidate, now, CancellationToken::new()).await.unwrap();

    assert_matches!(
        outcome,
        BookingOutcome::Rejected { reason: RejectionReason::TooSoon, .. }
    );
}

#[tokio::test]
async fn in_person_slots_intersect_professional_and_room_calendars() {
    let (store, professional_id, _) = seeded_store().await;
    let room_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();

    store
        .upsert_resource(Resource {
            id: room_id,
            kind: ResourceKind::Room,
            name: "Consultation Room A".to_string(),
            room_type: Some(RoomType::Physical),
            utc_offset_minutes: 0,
            is_bookable: true,
        })
        .await;
    // Room opens an hour after the professional.
    store
        .set_weekly_template(open_all_week(room_id, ResourceKind::Room, (9, 0), (17, 0)))
        .await;
    store
        .upsert_service_constraints(ServiceConstraints {
            service_id,
            mode: ServiceMode::InPerson,
            ..ServiceConstraints::default()
        })
        .await;

    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);

    let slots = engine
        .find_slots(service_id, professional_id, None, DateRange::single(date(2025, 3, 4)), now)
        .await
        .unwrap();

    assert!(!slots.is_empty());
    assert_eq!(slots[0].start, utc(2025, 3, 4, 9, 0));
    assert!(slots.iter().all(|slot| slot.room_id == Some(room_id)));
}

#[tokio::test]
async fn a_room_under_maintenance_yields_no_slots_that_day() {
    let (store, professional_id, _) = seeded_store().await;
    let room_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();

    store
        .upsert_resource(Resource {
            id: room_id,
            kind: ResourceKind::Room,
            name: "Consultation Room A".to_string(),
            room_type: Some(RoomType::Physical),
            utc_offset_minutes: 0,
            is_bookable: true,
        })
        .await;
    store
        .set_weekly_template(open_all_week(room_id, ResourceKind::Room, (8, 0), (18, 0)))
        .await;
    store
        .add_exclusion_window(
            room_id,
            ResourceKind::Room,
            ExclusionWindow {
                start_date: date(2025, 3, 3),
                end_date: date(2025, 3, 5),
                start_time: None,
                end_time: None,
                reason: Some("maintenance".to_string()),
                recurring: false,
            },
        )
        .await;
    store
        .upsert_service_constraints(ServiceConstraints {
            service_id,
            mode: ServiceMode::InPerson,
            ..ServiceConstraints::default()
        })
        .await;

    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);

    let during = engine
        .find_slots(service_id, professional_id, None, DateRange::single(date(2025, 3, 4)), now)
        .await
        .unwrap();
    assert!(during.is_empty());

    let after = engine
        .find_slots(service_id, professional_id, None, DateRange::single(date(2025, 3, 6)), now)
        .await
        .unwrap();
    assert!(!after.is_empty());
}

#[tokio::test]
async fn a_room_cannot_be_double_booked_across_professionals() {
    let (store, first_professional, _) = seeded_store().await;
    let second_professional = Uuid::new_v4();
    let room_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();

    store.upsert_resource(professional(second_professional)).await;
    store
        .set_weekly_template(open_all_week(
            second_professional,
            ResourceKind::Professional,
            (8, 0),
            (18, 0),
        ))
        .await;
    store
        .upsert_resource(Resource {
            id: room_id,
            kind: ResourceKind::Room,
            name: "Consultation Room A".to_string(),
            room_type: Some(RoomType::Physical),
            utc_offset_minutes: 0,
            is_bookable: true,
        })
        .await;
    store
        .set_weekly_template(open_all_week(room_id, ResourceKind::Room, (8, 0), (18, 0)))
        .await;
    store
        .upsert_service_constraints(ServiceConstraints {
            service_id,
            mode: ServiceMode::InPerson,
            ..ServiceConstraints::default()
        })
        .await;

    let engine = engine_for(&store);
    let now = utc(2025, 3, 3, 8, 0);
    let start = utc(2025, 3, 4, 10, 0);

    let first = engine
        .book(
            CandidateSlot {
                professional_id: first_professional,
                room_id: Some(room_id),
                service_id,
                start,
                end: start + Duration::minutes(50),
            },
            now,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(first.is_reserved());

    let second = engine
        .book(
            CandidateSlot {
                professional_id: second_professional,
                room_id: Some(room_id),
                service_id,
                start,
                end: start + Duration::minutes(50),
            },
            now,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_matches!(
        second,
        BookingOutcome::Rejected { reason: RejectionReason::Conflict, .. }
    );
    assert_eq!(store.appointment_count().await, 1);
}
