// libs/scheduling-cell/src/services/intersect.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    CandidateSlot, DateRange, ExclusionWindow, ExistingAppointment, Resource, ResourceKind,
    SchedulingError, ServiceConstraints, ServiceMode, TimeInterval, WeeklyTemplate,
};
use crate::services::{calendar, conflict, constraints, slots};
use crate::stores::{AppointmentStore, ResourceDirectory};

struct ResourceCalendar {
    resource: Resource,
    template: WeeklyTemplate,
    exclusions: Vec<ExclusionWindow>,
}

impl ResourceCalendar {
    fn open_on(&self, date: NaiveDate) -> Vec<TimeInterval> {
        calendar::resolve_open_intervals(
            &self.template,
            &self.exclusions,
            date,
            self.resource.timezone(),
        )
    }
}

/// Availability resolution across a professional, an optional room, and a
/// service's constraints. Read-only; safe to run on any number of tasks
/// concurrently.
pub struct AvailabilityService {
    directory: Arc<dyn ResourceDirectory>,
    appointments: Arc<dyn AppointmentStore>,
}

impl AvailabilityService {
    pub fn new(
        directory: Arc<dyn ResourceDirectory>,
        appointments: Arc<dyn AppointmentStore>,
    ) -> Self {
        Self {
            directory,
            appointments,
        }
    }

    /// Enumerate every bookable candidate slot for the service over the
    /// date range, ordered ascending by start time, then by room id when
    /// multiple rooms are eligible.
    pub async fn find_bookable_slots(
        &self,
        service_id: Uuid,
        professional_id: Uuid,
        room_id: Option<Uuid>,
        range: DateRange,
        now: DateTime<Utc>,
    ) -> Result<Vec<CandidateSlot>, SchedulingError> {
        debug!(
            %service_id, %professional_id, ?room_id,
            from = %range.from, to = %range.to,
            "resolving bookable slots"
        );

        let service = self.directory.get_service_constraints(service_id).await?;
        let professional = self
            .load_calendar(professional_id, ResourceKind::Professional)
            .await?;
        let rooms = self.resolve_rooms(&service, room_id).await?;

        if rooms.is_empty() {
            warn!(%service_id, "no bookable room available for service");
            return Ok(vec![]);
        }

        let tz = professional.resource.timezone();

        // Committed bookings over the whole search window, padded a day on
        // each side so buffer expansion never reaches past the listing.
        let busy_from = calendar::day_bounds(range.from, tz).start - Duration::days(1);
        let busy_to = calendar::day_bounds(range.to, tz).end + Duration::days(1);
        let professional_busy = self
            .appointments
            .list_active_appointments(professional_id, ResourceKind::Professional, busy_from, busy_to)
            .await?;
        let mut room_busy: Vec<Option<Vec<ExistingAppointment>>> = Vec::with_capacity(rooms.len());
        for room in &rooms {
            room_busy.push(match room {
                Some(room) => Some(
                    self.appointments
                        .list_active_appointments(
                            room.resource.id,
                            ResourceKind::Room,
                            busy_from,
                            busy_to,
                        )
                        .await?,
                ),
                None => None,
            });
        }

        let mut candidates = Vec::new();

        for date in range.days() {
            let professional_open = professional.open_on(date);
            if professional_open.is_empty() {
                continue;
            }

            for (room, busy) in rooms.iter().zip(&room_busy) {
                let room_resource = room.as_ref().map(|r| &r.resource);

                if let Some(reason) = constraints::evaluate_day(
                    &service,
                    professional_id,
                    room_resource,
                    date,
                    now,
                    tz,
                ) {
                    debug!(%date, %reason, "skipping day before slot generation");
                    continue;
                }

                let open = match room {
                    Some(room) => calendar::intersect_sets(&professional_open, &room.open_on(date)),
                    None => professional_open.clone(),
                };

                for start in slots::generate_slots(&open, &service, None) {
                    if constraints::evaluate(&service, professional_id, room_resource, start, now, tz)
                        .is_err()
                    {
                        continue;
                    }
                    let candidate = CandidateSlot {
                        professional_id,
                        room_id: room_resource.map(|r| r.id),
                        service_id,
                        start,
                        end: start + service.duration(),
                    };
                    // A slot overlapping a committed booking is not
                    // bookable; offering it would only bounce back as a
                    // conflict at commit time.
                    if conflict::check_candidate(
                        &candidate,
                        &service,
                        &professional_busy,
                        busy.as_deref()
                            .map(|appointments| (appointments, service.max_concurrent_bookings)),
                    ) {
                        continue;
                    }
                    candidates.push(candidate);
                }
            }
        }

        candidates.sort_by_key(|c| (c.start, c.room_id));
        debug!(count = candidates.len(), "bookable slots resolved");
        Ok(candidates)
    }

    /// Resolve a resource's open intervals on one date. Used by the
    /// coordinator to re-validate a candidate against current calendars.
    pub async fn open_intervals_for(
        &self,
        resource: &Resource,
        date: NaiveDate,
    ) -> Result<Vec<TimeInterval>, SchedulingError> {
        let template = self
            .directory
            .get_weekly_template(resource.id, resource.kind)
            .await?;
        let exclusions = self
            .directory
            .get_exclusion_windows(resource.id, resource.kind)
            .await?;
        Ok(calendar::resolve_open_intervals(
            &template,
            &exclusions,
            date,
            resource.timezone(),
        ))
    }

    async fn load_calendar(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
    ) -> Result<ResourceCalendar, SchedulingError> {
        let resource = self.directory.get_resource(resource_id, kind).await?;
        let template = self
            .directory
            .get_weekly_template(resource_id, kind)
            .await?;
        let exclusions = self
            .directory
            .get_exclusion_windows(resource_id, kind)
            .await?;
        Ok(ResourceCalendar {
            resource,
            template,
            exclusions,
        })
    }

    /// The room calendars a search should consider. `None` entries mean the
    /// service can run without a room (online services only).
    async fn resolve_rooms(
        &self,
        service: &ServiceConstraints,
        room_id: Option<Uuid>,
    ) -> Result<Vec<Option<ResourceCalendar>>, SchedulingError> {
        let room_ids: Vec<Uuid> = match room_id {
            Some(id) => vec![id],
            None if !service.eligible_room_ids.is_empty() => service.eligible_room_ids.clone(),
            None => {
                let rooms = self
                    .directory
                    .list_bookable_rooms(service.mode.compatible_room_type())
                    .await?;
                if rooms.is_empty() && service.mode == ServiceMode::Online {
                    return Ok(vec![None]);
                }
                rooms.into_iter().map(|r| r.id).collect()
            }
        };

        let mut calendars = Vec::with_capacity(room_ids.len());
        for id in room_ids {
            calendars.push(Some(self.load_calendar(id, ResourceKind::Room).await?));
        }
        Ok(calendars)
    }
}
