// libs/scheduling-cell/src/engine.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{BookingOutcome, CandidateSlot, DateRange, SchedulingError};
use crate::services::{AvailabilityService, BookingCoordinator};
use crate::stores::{AppointmentStore, CachedResourceDirectory, ResourceDirectory};

/// Facade over availability resolution and booking coordination. Cheap to
/// construct; callers that serve many requests should construct it once and
/// share it behind an `Arc`.
pub struct SchedulingEngine {
    availability: AvailabilityService,
    coordinator: BookingCoordinator,
}

impl SchedulingEngine {
    pub fn new(
        directory: Arc<dyn ResourceDirectory>,
        appointments: Arc<dyn AppointmentStore>,
    ) -> Self {
        Self {
            availability: AvailabilityService::new(Arc::clone(&directory), Arc::clone(&appointments)),
            coordinator: BookingCoordinator::new(directory, appointments),
        }
    }

    /// Like `new`, but wraps the directory in a short-TTL cache for the
    /// read-mostly template and exclusion data. Appointment reads stay
    /// uncached either way.
    pub fn with_cached_directory(
        directory: Arc<dyn ResourceDirectory>,
        appointments: Arc<dyn AppointmentStore>,
        ttl: Duration,
    ) -> Self {
        let cached: Arc<dyn ResourceDirectory> =
            Arc::new(CachedResourceDirectory::new(directory, ttl));
        Self::new(cached, appointments)
    }

    /// Enumerate bookable candidate slots. Read-only and idempotent: repeated
    /// calls against an unchanged store return the same slots.
    pub async fn find_slots(
        &self,
        service_id: Uuid,
        professional_id: Uuid,
        room_id: Option<Uuid>,
        range: DateRange,
        now: DateTime<Utc>,
    ) -> Result<Vec<CandidateSlot>, SchedulingError> {
        self.availability
            .find_bookable_slots(service_id, professional_id, room_id, range, now)
            .await
    }

    /// Re-validate and atomically commit a candidate slot.
    pub async fn book(
        &self,
        candidate: CandidateSlot,
        now: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> Result<BookingOutcome, SchedulingError> {
        self.coordinator.book(candidate, now, cancel).await
    }
}
