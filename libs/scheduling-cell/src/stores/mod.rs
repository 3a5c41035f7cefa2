// libs/scheduling-cell/src/stores/mod.rs
//
// Interfaces to the external collaborator stores. The engine consults
// resource configuration through `ResourceDirectory` and reads/commits
// appointments through `AppointmentStore`; it never owns their persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    BookingReservation, CandidateSlot, ExclusionWindow, ExistingAppointment, Resource,
    ResourceKind, RoomType, ServiceConstraints, WeeklyTemplate,
};

pub mod cache;
pub mod memory;
pub mod rest;

pub use cache::CachedResourceDirectory;
pub use memory::InMemoryStore;
pub use rest::{RestAppointmentStore, RestResourceDirectory};

use crate::models::SchedulingError;

impl From<StoreError> for SchedulingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => SchedulingError::Validation(format!("not found: {}", id)),
            StoreError::Unavailable(msg) | StoreError::Malformed(msg) => {
                SchedulingError::UpstreamUnavailable(msg)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(Uuid),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed store payload: {0}")]
    Malformed(String),
}

/// Result of an atomic commit attempt. `Conflict` means another booking won
/// the slot; the caller must re-run slot generation rather than retry the
/// same candidate.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    Reserved(BookingReservation),
    Conflict,
}

/// Read access to resource configuration: weekly templates, exclusion
/// windows, service constraints, and the room catalog.
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    async fn get_resource(&self, id: Uuid, kind: ResourceKind) -> Result<Resource, StoreError>;

    async fn get_weekly_template(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
    ) -> Result<WeeklyTemplate, StoreError>;

    async fn get_exclusion_windows(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
    ) -> Result<Vec<ExclusionWindow>, StoreError>;

    async fn get_service_constraints(
        &self,
        service_id: Uuid,
    ) -> Result<ServiceConstraints, StoreError>;

    async fn list_bookable_rooms(&self, room_type: RoomType) -> Result<Vec<Resource>, StoreError>;
}

/// Read and commit access to the appointment store. Listings must always be
/// read fresh immediately before a commit; staleness there directly causes
/// double-booking, so implementations of this trait are never cached.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn list_active_appointments(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExistingAppointment>, StoreError>;

    /// Atomically re-check and reserve the candidate slot. Two concurrent
    /// commits for overlapping slots on the same resource must never both
    /// return `Reserved`.
    async fn commit_appointment(
        &self,
        candidate: &CandidateSlot,
        constraints: &ServiceConstraints,
    ) -> Result<CommitOutcome, StoreError>;
}
