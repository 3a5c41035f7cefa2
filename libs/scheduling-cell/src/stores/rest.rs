// libs/scheduling-cell/src/stores/rest.rs
//
// PostgREST-backed store implementations. Commit safety here must hold
// across replicas, so the commit path takes short-lived claim rows (unique
// per resource) in the store itself, re-checks conflicts under the claims,
// and only then inserts the appointment.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::ClinicStoreClient;

use crate::models::{
    AppointmentStatus, BookingReservation, CandidateSlot, ExclusionWindow, ExistingAppointment,
    Resource, ResourceKind, RoomType, ServiceConstraints, TemplateEntry, WeeklyTemplate,
};
use crate::services::conflict;
use crate::stores::{AppointmentStore, CommitOutcome, ResourceDirectory, StoreError};

const CLAIM_TTL_SECONDS: i64 = 30;

fn unavailable(e: anyhow::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn malformed(e: serde_json::Error) -> StoreError {
    StoreError::Malformed(e.to_string())
}

fn representation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

pub struct RestResourceDirectory {
    client: Arc<ClinicStoreClient>,
}

impl RestResourceDirectory {
    pub fn new(client: Arc<ClinicStoreClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceDirectory for RestResourceDirectory {
    async fn get_resource(&self, id: Uuid, kind: ResourceKind) -> Result<Resource, StoreError> {
        let path = format!("/rest/v1/resources?id=eq.{}&kind=eq.{}", id, kind);
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(unavailable)?;

        let row = result.into_iter().next().ok_or(StoreError::NotFound(id))?;
        serde_json::from_value(row).map_err(malformed)
    }

    async fn get_weekly_template(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
    ) -> Result<WeeklyTemplate, StoreError> {
        debug!("Fetching weekly template for {} {}", kind, resource_id);

        let path = format!(
            "/rest/v1/weekly_template_entries?resource_id=eq.{}&resource_kind=eq.{}&order=day_of_week.asc",
            resource_id, kind
        );
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(unavailable)?;

        let entries: Vec<TemplateEntry> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<TemplateEntry>, _>>()
            .map_err(malformed)?;

        let template = WeeklyTemplate {
            resource_id,
            resource_kind: kind,
            entries,
        };
        // Upstream rows are not trusted; a template violating its own
        // invariants must fail the read, not corrupt resolution.
        template
            .validate()
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(template)
    }

    async fn get_exclusion_windows(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
    ) -> Result<Vec<ExclusionWindow>, StoreError> {
        let path = format!(
            "/rest/v1/exclusion_windows?resource_id=eq.{}&resource_kind=eq.{}&order=start_date.asc",
            resource_id, kind
        );
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(unavailable)?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ExclusionWindow>, _>>()
            .map_err(malformed)
    }

    async fn get_service_constraints(
        &self,
        service_id: Uuid,
    ) -> Result<ServiceConstraints, StoreError> {
        let path = format!("/rest/v1/service_constraints?service_id=eq.{}", service_id);
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(unavailable)?;

        let row = result
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound(service_id))?;
        serde_json::from_value(row).map_err(malformed)
    }

    async fn list_bookable_rooms(&self, room_type: RoomType) -> Result<Vec<Resource>, StoreError> {
        let path = format!(
            "/rest/v1/resources?kind=eq.room&room_type=eq.{}&is_bookable=eq.true&order=id.asc",
            room_type
        );
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(unavailable)?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Resource>, _>>()
            .map_err(malformed)
    }
}

#[derive(Debug, Deserialize)]
struct AppointmentRow {
    id: Uuid,
    version: i64,
    created_at: DateTime<Utc>,
}

pub struct RestAppointmentStore {
    client: Arc<ClinicStoreClient>,
    process_id: String,
}

impl RestAppointmentStore {
    pub fn new(client: Arc<ClinicStoreClient>) -> Self {
        Self {
            client,
            process_id: format!("scheduler_{}", Uuid::new_v4()),
        }
    }

    /// Try to claim a resource for the duration of one commit. The claim
    /// table carries a unique index on `(resource_id, resource_kind)`, so
    /// a second in-flight commit for the same resource fails the insert.
    async fn acquire_claim(&self, resource_id: Uuid, kind: ResourceKind) -> Result<bool, StoreError> {
        if self.try_claim_insert(resource_id, kind).await? {
            return Ok(true);
        }

        // The claim may belong to a crashed committer; sweep expired rows
        // and try once more.
        self.cleanup_expired_claims(resource_id, kind).await?;
        self.try_claim_insert(resource_id, kind).await
    }

    /// `Ok(false)` only when the claim row already exists. Transport and
    /// server failures are not contention and must not be reported as
    /// `Conflict`; they surface as `Unavailable` for the caller to retry.
    async fn try_claim_insert(&self, resource_id: Uuid, kind: ResourceKind) -> Result<bool, StoreError> {
        let claim = json!({
            "resource_id": resource_id,
            "resource_kind": kind,
            "claimed_at": Utc::now().to_rfc3339(),
            "expires_at": (Utc::now() + Duration::seconds(CLAIM_TTL_SECONDS)).to_rfc3339(),
            "process_id": self.process_id,
        });

        match self
            .client
            .request_with_headers::<Vec<Value>>(
                Method::POST,
                "/rest/v1/slot_claims",
                Some(claim),
                Some(representation_headers()),
            )
            .await
        {
            Ok(_) => {
                debug!(%resource_id, "commit claim acquired");
                Ok(true)
            }
            Err(e) if e.to_string().starts_with("Conflict") => Ok(false),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn cleanup_expired_claims(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
    ) -> Result<(), StoreError> {
        let path = format!(
            "/rest/v1/slot_claims?resource_id=eq.{}&resource_kind=eq.{}&expires_at=lt.{}",
            resource_id,
            kind,
            Utc::now().to_rfc3339()
        );
        let _: Vec<Value> = self
            .client
            .request_with_headers(Method::DELETE, &path, None, Some(representation_headers()))
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn release_claims(&self, claimed: &[(Uuid, ResourceKind)]) {
        for (resource_id, kind) in claimed {
            let path = format!(
                "/rest/v1/slot_claims?resource_id=eq.{}&resource_kind=eq.{}&process_id=eq.{}",
                resource_id, kind, self.process_id
            );
            let released: Result<Vec<Value>, _> = self
                .client
                .request_with_headers(Method::DELETE, &path, None, Some(representation_headers()))
                .await;
            if released.is_err() {
                // Expiry will reclaim it.
                warn!(%resource_id, "failed to release commit claim");
            }
        }
    }

    async fn conflicts_under_claim(
        &self,
        candidate: &CandidateSlot,
        constraints: &ServiceConstraints,
    ) -> Result<bool, StoreError> {
        let expanded = candidate.expanded_interval(constraints);
        let from = expanded.start - Duration::days(1);
        let to = expanded.end + Duration::days(1);

        let professional_existing = self
            .list_active_appointments(candidate.professional_id, ResourceKind::Professional, from, to)
            .await?;

        let room_existing = match candidate.room_id {
            Some(room_id) => Some(
                self.list_active_appointments(room_id, ResourceKind::Room, from, to)
                    .await?,
            ),
            None => None,
        };

        Ok(conflict::check_candidate(
            candidate,
            constraints,
            &professional_existing,
            room_existing
                .as_deref()
                .map(|appointments| (appointments, constraints.max_concurrent_bookings)),
        ))
    }

    async fn insert_appointment(
        &self,
        candidate: &CandidateSlot,
        constraints: &ServiceConstraints,
    ) -> Result<BookingReservation, StoreError> {
        let appointment_id = Uuid::new_v4();
        let body = json!({
            "id": appointment_id,
            "professional_id": candidate.professional_id,
            "room_id": candidate.room_id,
            "service_id": candidate.service_id,
            "start": candidate.start.to_rfc3339(),
            "end": candidate.end.to_rfc3339(),
            "status": AppointmentStatus::Scheduled,
            "buffer_before_minutes": constraints.buffer_before_minutes,
            "buffer_after_minutes": constraints.buffer_after_minutes,
            "created_at": Utc::now().to_rfc3339(),
        });

        let result: Vec<Value> = self
            .client
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(body),
                Some(representation_headers()),
            )
            .await
            .map_err(unavailable)?;

        let row: AppointmentRow = result
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Malformed("appointment insert returned no row".to_string()))
            .and_then(|row| serde_json::from_value(row).map_err(malformed))?;

        Ok(BookingReservation {
            appointment_id: row.id,
            professional_id: candidate.professional_id,
            room_id: candidate.room_id,
            service_id: candidate.service_id,
            start: candidate.start,
            end: candidate.end,
            status: AppointmentStatus::Scheduled,
            version: row.version,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl AppointmentStore for RestAppointmentStore {
    async fn list_active_appointments(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExistingAppointment>, StoreError> {
        let path = format!(
            "/rest/v1/resource_bookings?resource_id=eq.{}&resource_kind=eq.{}&status=in.(scheduled,confirmed)&start=lt.{}&end=gt.{}&order=start.asc",
            resource_id,
            kind,
            to.to_rfc3339(),
            from.to_rfc3339()
        );
        let result: Vec<Value> = self
            .client
            .request(Method::GET, &path, None)
            .await
            .map_err(unavailable)?;

        result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ExistingAppointment>, _>>()
            .map_err(malformed)
    }

    async fn commit_appointment(
        &self,
        candidate: &CandidateSlot,
        constraints: &ServiceConstraints,
    ) -> Result<CommitOutcome, StoreError> {
        let mut involved = vec![(candidate.professional_id, ResourceKind::Professional)];
        if let Some(room_id) = candidate.room_id {
            involved.push((room_id, ResourceKind::Room));
        }
        // Deterministic claim order keeps racing committers from holding
        // claims in opposite orders.
        involved.sort_by_key(|(resource_id, _)| *resource_id);

        let mut claimed: Vec<(Uuid, ResourceKind)> = Vec::new();
        for (resource_id, kind) in &involved {
            match self.acquire_claim(*resource_id, *kind).await {
                Ok(true) => claimed.push((*resource_id, *kind)),
                Ok(false) => {
                    debug!(%resource_id, "resource already claimed by another commit");
                    self.release_claims(&claimed).await;
                    return Ok(CommitOutcome::Conflict);
                }
                Err(e) => {
                    self.release_claims(&claimed).await;
                    return Err(e);
                }
            }
        }

        // Final conflict check against the current store state, under the
        // claims, never a snapshot from slot generation.
        let conflicting = match self.conflicts_under_claim(candidate, constraints).await {
            Ok(conflicting) => conflicting,
            Err(e) => {
                self.release_claims(&claimed).await;
                return Err(e);
            }
        };
        if conflicting {
            self.release_claims(&claimed).await;
            return Ok(CommitOutcome::Conflict);
        }

        let reservation = match self.insert_appointment(candidate, constraints).await {
            Ok(reservation) => reservation,
            Err(e) => {
                self.release_claims(&claimed).await;
                return Err(e);
            }
        };

        self.release_claims(&claimed).await;
        Ok(CommitOutcome::Reserved(reservation))
    }
}
