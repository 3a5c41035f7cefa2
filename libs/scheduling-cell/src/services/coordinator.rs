// libs/scheduling-cell/src/services/coordinator.rs
//
// Booking transaction coordination: Requested -> Validating -> Reserved |
// Rejected. Validation always runs against the current appointment store
// state, and the commit itself is delegated to the store's atomic
// conditional write, so two coordinators racing for the same slot cannot
// both succeed. Neither terminal state is retried here; retry policy
// belongs to the caller.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{
    BookingOutcome, BookingState, CandidateSlot, DateRange, RejectionReason, Resource,
    ResourceKind, SchedulingError, ServiceConstraints,
};
use crate::services::{conflict, constraints, intersect::AvailabilityService};
use crate::stores::{AppointmentStore, CommitOutcome, ResourceDirectory};

const MAX_ALTERNATIVE_SLOTS: usize = 5;
const ALTERNATIVE_SEARCH_DAYS: i64 = 3;

pub struct BookingCoordinator {
    directory: Arc<dyn ResourceDirectory>,
    appointments: Arc<dyn AppointmentStore>,
    availability: AvailabilityService,
}

impl BookingCoordinator {
    pub fn new(
        directory: Arc<dyn ResourceDirectory>,
        appointments: Arc<dyn AppointmentStore>,
    ) -> Self {
        let availability =
            AvailabilityService::new(Arc::clone(&directory), Arc::clone(&appointments));
        Self {
            directory,
            appointments,
            availability,
        }
    }

    /// Attempt to reserve the candidate slot. The cancellation token lets
    /// the caller abort at any point before the reservation is written;
    /// aborted attempts perform no partial writes and terminate as
    /// `Rejected(CANCELLED)`.
    pub async fn book(
        &self,
        candidate: CandidateSlot,
        now: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> Result<BookingOutcome, SchedulingError> {
        debug!(
            state = %BookingState::Requested,
            professional_id = %candidate.professional_id,
            start = %candidate.start,
            "booking attempt received"
        );

        if cancel.is_cancelled() {
            return Ok(self.rejected(RejectionReason::Cancelled));
        }

        debug!(state = %BookingState::Validating, start = %candidate.start, "re-validating candidate");

        let service = self
            .directory
            .get_service_constraints(candidate.service_id)
            .await?;

        if candidate.end - candidate.start != service.duration() {
            return Err(SchedulingError::Validation(format!(
                "candidate span does not match service duration of {} minutes",
                service.duration_minutes
            )));
        }

        let professional = self
            .directory
            .get_resource(candidate.professional_id, ResourceKind::Professional)
            .await?;
        let room = match candidate.room_id {
            Some(room_id) => Some(
                self.directory
                    .get_resource(room_id, ResourceKind::Room)
                    .await?,
            ),
            None => None,
        };

        let tz = professional.timezone();
        if let Err(reason) = constraints::evaluate(
            &service,
            candidate.professional_id,
            room.as_ref(),
            candidate.start,
            now,
            tz,
        ) {
            return Ok(self.rejected(reason));
        }

        for resource in [Some(&professional), room.as_ref()].into_iter().flatten() {
            if !self.slot_is_open(&candidate, &service, resource).await? {
                return Ok(self.rejected(RejectionReason::ResourceClosed));
            }
        }

        // Fresh conflict state, never the snapshot from slot generation.
        let conflicting = tokio::select! {
            _ = cancel.cancelled() => return Ok(self.rejected(RejectionReason::Cancelled)),
            result = self.has_fresh_conflict(&candidate, &service) => result?,
        };
        if conflicting {
            warn!(start = %candidate.start, "candidate conflicts with an existing reservation");
            return Ok(self.conflict_rejection(&candidate, now).await);
        }

        // Last gate before the write; past this point the commit decides.
        if cancel.is_cancelled() {
            debug!(state = %BookingState::Rejected, "booking attempt cancelled by caller");
            return Ok(self.rejected(RejectionReason::Cancelled));
        }

        match self
            .appointments
            .commit_appointment(&candidate, &service)
            .await?
        {
            CommitOutcome::Reserved(reservation) => {
                info!(
                    state = %BookingState::Reserved,
                    appointment_id = %reservation.appointment_id,
                    version = reservation.version,
                    "booking reserved"
                );
                Ok(BookingOutcome::Reserved(reservation))
            }
            CommitOutcome::Conflict => {
                warn!(
                    state = %BookingState::Rejected,
                    start = %candidate.start,
                    "lost the commit race, candidate is stale"
                );
                Ok(self.conflict_rejection(&candidate, now).await)
            }
        }
    }

    fn rejected(&self, reason: RejectionReason) -> BookingOutcome {
        debug!(state = %BookingState::Rejected, %reason, "booking attempt rejected");
        BookingOutcome::rejected(reason)
    }

    /// Conflict rejections carry a freshly recomputed alternative list so
    /// the caller can offer the user immediate options.
    async fn conflict_rejection(&self, candidate: &CandidateSlot, now: DateTime<Utc>) -> BookingOutcome {
        let from = candidate.start.date_naive();
        let to = (candidate.start + Duration::days(ALTERNATIVE_SEARCH_DAYS)).date_naive();

        let mut alternatives = self
            .availability
            .find_bookable_slots(
                candidate.service_id,
                candidate.professional_id,
                candidate.room_id,
                DateRange::new(from, to),
                now,
            )
            .await
            .unwrap_or_default();

        alternatives.retain(|slot| slot.start != candidate.start);
        alternatives.truncate(MAX_ALTERNATIVE_SLOTS);

        BookingOutcome::Rejected {
            reason: RejectionReason::Conflict,
            alternatives,
        }
    }

    async fn slot_is_open(
        &self,
        candidate: &CandidateSlot,
        service: &ServiceConstraints,
        resource: &Resource,
    ) -> Result<bool, SchedulingError> {
        let date = candidate.start.with_timezone(&resource.timezone()).date_naive();
        let open = self.availability.open_intervals_for(resource, date).await?;
        Ok(open.iter().any(|interval| {
            candidate.start >= interval.start
                && candidate.end + service.buffer_after() <= interval.end
        }))
    }

    async fn has_fresh_conflict(
        &self,
        candidate: &CandidateSlot,
        service: &ServiceConstraints,
    ) -> Result<bool, SchedulingError> {
        let expanded = candidate.expanded_interval(service);
        let from = expanded.start - Duration::days(1);
        let to = expanded.end + Duration::days(1);

        let professional_existing = self
            .appointments
            .list_active_appointments(candidate.professional_id, ResourceKind::Professional, from, to)
            .await?;

        let room_existing = match candidate.room_id {
            Some(room_id) => Some(
                self.appointments
                    .list_active_appointments(room_id, ResourceKind::Room, from, to)
                    .await?,
            ),
            None => None,
        };

        Ok(conflict::check_candidate(
            candidate,
            service,
            &professional_existing,
            room_existing
                .as_deref()
                .map(|appointments| (appointments, service.max_concurrent_bookings)),
        ))
    }
}
