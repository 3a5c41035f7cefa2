// libs/scheduling-cell/src/stores/memory.rs
//
// In-process store for single-replica deployments and tests. Commits
// serialize on one async mutex, so check-then-insert is atomic against
// concurrent booking attempts; this protection does not extend across
// processes (use the REST store for multi-replica setups).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    AppointmentStatus, BookingReservation, CandidateSlot, ExclusionWindow, ExistingAppointment,
    Resource, ResourceKind, RoomType, ServiceConstraints, WeeklyTemplate,
};
use crate::services::conflict;
use crate::stores::{AppointmentStore, CommitOutcome, ResourceDirectory, StoreError};

#[derive(Debug, Clone)]
struct StoredAppointment {
    id: Uuid,
    professional_id: Uuid,
    room_id: Option<Uuid>,
    service_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    status: AppointmentStatus,
    buffer_before_minutes: i32,
    buffer_after_minutes: i32,
    version: i64,
}

impl StoredAppointment {
    fn involves(&self, resource_id: Uuid, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Professional => self.professional_id == resource_id,
            ResourceKind::Room => self.room_id == Some(resource_id),
        }
    }

    fn as_existing(&self, resource_id: Uuid, kind: ResourceKind) -> ExistingAppointment {
        ExistingAppointment {
            id: self.id,
            resource_id,
            resource_kind: kind,
            service_id: self.service_id,
            start: self.start,
            end: self.end,
            status: self.status,
            buffer_before_minutes: self.buffer_before_minutes,
            buffer_after_minutes: self.buffer_after_minutes,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    resources: HashMap<(Uuid, ResourceKind), Resource>,
    templates: HashMap<(Uuid, ResourceKind), WeeklyTemplate>,
    exclusions: HashMap<(Uuid, ResourceKind), Vec<ExclusionWindow>>,
    constraints: HashMap<Uuid, ServiceConstraints>,
    appointments: Vec<StoredAppointment>,
    next_version: i64,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_resource(&self, resource: Resource) {
        let mut state = self.state.lock().await;
        state.resources.insert((resource.id, resource.kind), resource);
    }

    pub async fn set_weekly_template(&self, template: WeeklyTemplate) {
        let mut state = self.state.lock().await;
        state
            .templates
            .insert((template.resource_id, template.resource_kind), template);
    }

    pub async fn add_exclusion_window(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
        window: ExclusionWindow,
    ) {
        let mut state = self.state.lock().await;
        state
            .exclusions
            .entry((resource_id, kind))
            .or_default()
            .push(window);
    }

    pub async fn upsert_service_constraints(&self, constraints: ServiceConstraints) {
        let mut state = self.state.lock().await;
        state.constraints.insert(constraints.service_id, constraints);
    }

    /// Insert an appointment without conflict checking. Test fixture path;
    /// real bookings go through `commit_appointment`.
    pub async fn insert_appointment(
        &self,
        candidate: &CandidateSlot,
        constraints: &ServiceConstraints,
        status: AppointmentStatus,
    ) -> Uuid {
        let mut state = self.state.lock().await;
        state.next_version += 1;
        let id = Uuid::new_v4();
        let version = state.next_version;
        state.appointments.push(StoredAppointment {
            id,
            professional_id: candidate.professional_id,
            room_id: candidate.room_id,
            service_id: candidate.service_id,
            start: candidate.start,
            end: candidate.end,
            status,
            buffer_before_minutes: constraints.buffer_before_minutes,
            buffer_after_minutes: constraints.buffer_after_minutes,
            version,
        });
        id
    }

    pub async fn set_appointment_status(&self, appointment_id: Uuid, status: AppointmentStatus) -> bool {
        let mut state = self.state.lock().await;
        match state
            .appointments
            .iter_mut()
            .find(|a| a.id == appointment_id)
        {
            Some(appointment) => {
                appointment.status = status;
                true
            }
            None => false,
        }
    }

    pub async fn appointment_count(&self) -> usize {
        self.state.lock().await.appointments.len()
    }
}

#[async_trait]
impl ResourceDirectory for InMemoryStore {
    async fn get_resource(&self, id: Uuid, kind: ResourceKind) -> Result<Resource, StoreError> {
        let state = self.state.lock().await;
        state
            .resources
            .get(&(id, kind))
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn get_weekly_template(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
    ) -> Result<WeeklyTemplate, StoreError> {
        let state = self.state.lock().await;
        state
            .templates
            .get(&(resource_id, kind))
            .cloned()
            .ok_or(StoreError::NotFound(resource_id))
    }

    async fn get_exclusion_windows(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
    ) -> Result<Vec<ExclusionWindow>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .exclusions
            .get(&(resource_id, kind))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_service_constraints(
        &self,
        service_id: Uuid,
    ) -> Result<ServiceConstraints, StoreError> {
        let state = self.state.lock().await;
        state
            .constraints
            .get(&service_id)
            .cloned()
            .ok_or(StoreError::NotFound(service_id))
    }

    async fn list_bookable_rooms(&self, room_type: RoomType) -> Result<Vec<Resource>, StoreError> {
        let state = self.state.lock().await;
        let mut rooms: Vec<Resource> = state
            .resources
            .values()
            .filter(|r| {
                r.kind == ResourceKind::Room && r.is_bookable && r.room_type == Some(room_type)
            })
            .cloned()
            .collect();
        rooms.sort_by_key(|r| r.id);
        Ok(rooms)
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn list_active_appointments(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExistingAppointment>, StoreError> {
        let state = self.state.lock().await;
        let mut appointments: Vec<ExistingAppointment> = state
            .appointments
            .iter()
            .filter(|a| {
                a.involves(resource_id, kind)
                    && a.status.is_blocking()
                    && a.start < to
                    && a.end > from
            })
            .map(|a| a.as_existing(resource_id, kind))
            .collect();
        appointments.sort_by_key(|a| a.start);
        Ok(appointments)
    }

    async fn commit_appointment(
        &self,
        candidate: &CandidateSlot,
        constraints: &ServiceConstraints,
    ) -> Result<CommitOutcome, StoreError> {
        // The whole check-then-insert runs under one lock; concurrent
        // commits for the same window cannot interleave.
        let mut state = self.state.lock().await;

        let professional_existing: Vec<ExistingAppointment> = state
            .appointments
            .iter()
            .filter(|a| a.involves(candidate.professional_id, ResourceKind::Professional))
            .map(|a| a.as_existing(candidate.professional_id, ResourceKind::Professional))
            .collect();

        let room_existing: Option<Vec<ExistingAppointment>> = candidate.room_id.map(|room_id| {
            state
                .appointments
                .iter()
                .filter(|a| a.involves(room_id, ResourceKind::Room))
                .map(|a| a.as_existing(room_id, ResourceKind::Room))
                .collect()
        });

        let conflicting = conflict::check_candidate(
            candidate,
            constraints,
            &professional_existing,
            room_existing
                .as_deref()
                .map(|appointments| (appointments, constraints.max_concurrent_bookings)),
        );

        if conflicting {
            debug!(
                professional_id = %candidate.professional_id,
                start = %candidate.start,
                "commit lost to an existing reservation"
            );
            return Ok(CommitOutcome::Conflict);
        }

        state.next_version += 1;
        let version = state.next_version;
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        state.appointments.push(StoredAppointment {
            id,
            professional_id: candidate.professional_id,
            room_id: candidate.room_id,
            service_id: candidate.service_id,
            start: candidate.start,
            end: candidate.end,
            status: AppointmentStatus::Scheduled,
            buffer_before_minutes: constraints.buffer_before_minutes,
            buffer_after_minutes: constraints.buffer_after_minutes,
            version,
        });

        info!(appointment_id = %id, version, "appointment reserved");

        Ok(CommitOutcome::Reserved(BookingReservation {
            appointment_id: id,
            professional_id: candidate.professional_id,
            room_id: candidate.room_id,
            service_id: candidate.service_id,
            start: candidate.start,
            end: candidate.end,
            status: AppointmentStatus::Scheduled,
            version,
            created_at,
        }))
    }
}
