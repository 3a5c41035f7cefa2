// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// RESOURCES
// ==============================================================================

/// The two bookable entity kinds in this engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Professional,
    Room,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Professional => write!(f, "professional"),
            ResourceKind::Room => write!(f, "room"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Physical,
    Virtual,
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomType::Physical => write!(f, "physical"),
            RoomType::Virtual => write!(f, "virtual"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceMode {
    InPerson,
    Online,
}

impl ServiceMode {
    /// The room type a service of this mode can be delivered in.
    pub fn compatible_room_type(&self) -> RoomType {
        match self {
            ServiceMode::InPerson => RoomType::Physical,
            ServiceMode::Online => RoomType::Virtual,
        }
    }
}

/// A bookable resource: a professional or a room (physical or virtual).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub kind: ResourceKind,
    pub name: String,
    pub room_type: Option<RoomType>,
    pub utc_offset_minutes: i32,
    pub is_bookable: bool,
}

impl Resource {
    /// The resource's configured timezone. Weekly-template day-of-week
    /// lookups are evaluated in this offset, never in an ambient clock.
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }
}

// ==============================================================================
// AVAILABILITY CONFIGURATION
// ==============================================================================

/// One weekday's open window. Days without an entry are implicitly closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEntry {
    /// 0 = Sunday .. 6 = Saturday.
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_open: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyTemplate {
    pub resource_id: Uuid,
    pub resource_kind: ResourceKind,
    pub entries: Vec<TemplateEntry>,
}

impl WeeklyTemplate {
    pub fn entry_for(&self, day_of_week: u8) -> Option<&TemplateEntry> {
        self.entries.iter().find(|e| e.day_of_week == day_of_week)
    }

    pub fn validate(&self) -> Result<(), SchedulingError> {
        for entry in &self.entries {
            if entry.day_of_week > 6 {
                return Err(SchedulingError::Validation(format!(
                    "day of week must be between 0 (Sunday) and 6 (Saturday), got {}",
                    entry.day_of_week
                )));
            }
            if entry.is_open && entry.start_time >= entry.end_time {
                return Err(SchedulingError::Validation(format!(
                    "template start time {} must be before end time {}",
                    entry.start_time, entry.end_time
                )));
            }
            let duplicates = self
                .entries
                .iter()
                .filter(|e| e.day_of_week == entry.day_of_week)
                .count();
            if duplicates > 1 {
                return Err(SchedulingError::Validation(format!(
                    "multiple template entries for day of week {}",
                    entry.day_of_week
                )));
            }
        }
        Ok(())
    }
}

/// A vacation or maintenance window that overrides the weekly template to
/// closed for the overlapping span. All-day when no times are given; a
/// partial-day window (maintenance) carries start/end times that apply on
/// every covered date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub recurring: bool,
}

impl ExclusionWindow {
    /// Whether this window closes (part of) the given date. Recurring
    /// windows match by month/day regardless of year, including ranges that
    /// wrap the year boundary (e.g. Dec 28 - Jan 3).
    pub fn applies_on(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;

        if self.recurring {
            let d = (date.month(), date.day());
            let from = (self.start_date.month(), self.start_date.day());
            let to = (self.end_date.month(), self.end_date.day());
            if from <= to {
                from <= d && d <= to
            } else {
                d >= from || d <= to
            }
        } else {
            self.start_date <= date && date <= self.end_date
        }
    }
}

// ==============================================================================
// SERVICE CONSTRAINTS
// ==============================================================================

/// Per-service booking rules, owned by the service catalog and consulted,
/// never mutated, by this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConstraints {
    pub service_id: Uuid,
    pub mode: ServiceMode,
    pub duration_minutes: i32,
    pub buffer_before_minutes: i32,
    pub buffer_after_minutes: i32,
    pub min_advance_booking_hours: i32,
    pub max_advance_booking_days: i32,
    pub allow_same_day_booking: bool,
    pub max_concurrent_bookings: i32,
    /// Empty means every professional offers this service.
    pub eligible_professional_ids: Vec<Uuid>,
    /// Empty means any bookable room of the compatible type.
    pub eligible_room_ids: Vec<Uuid>,
}

impl ServiceConstraints {
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes as i64)
    }

    pub fn buffer_before(&self) -> Duration {
        Duration::minutes(self.buffer_before_minutes as i64)
    }

    pub fn buffer_after(&self) -> Duration {
        Duration::minutes(self.buffer_after_minutes as i64)
    }

    pub fn professional_eligible(&self, professional_id: Uuid) -> bool {
        self.eligible_professional_ids.is_empty()
            || self.eligible_professional_ids.contains(&professional_id)
    }

    pub fn room_eligible(&self, room_id: Uuid) -> bool {
        self.eligible_room_ids.is_empty() || self.eligible_room_ids.contains(&room_id)
    }
}

impl Default for ServiceConstraints {
    fn default() -> Self {
        Self {
            service_id: Uuid::nil(),
            mode: ServiceMode::InPerson,
            duration_minutes: 50,
            buffer_before_minutes: 10,
            buffer_after_minutes: 10,
            min_advance_booking_hours: 2,
            max_advance_booking_days: 90,
            allow_same_day_booking: true,
            max_concurrent_bookings: 1,
            eligible_professional_ids: vec![],
            eligible_room_ids: vec![],
        }
    }
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Cancelled,
    NoShow,
    Completed,
}

impl AppointmentStatus {
    /// Only scheduled and confirmed appointments block new bookings;
    /// a cancelled appointment frees its slot immediately.
    pub fn is_blocking(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// One resource's view of a stored appointment, as returned by the
/// appointment store. Buffers are denormalized onto the row so conflict
/// checks can expand the interval without fetching the service again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingAppointment {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub resource_kind: ResourceKind,
    pub service_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub buffer_before_minutes: i32,
    pub buffer_after_minutes: i32,
}

impl ExistingAppointment {
    pub fn blocks_new_bookings(&self) -> bool {
        self.status.is_blocking()
    }

    /// The stored span expanded by this appointment's own buffers.
    pub fn expanded_interval(&self) -> TimeInterval {
        TimeInterval {
            start: self.start - Duration::minutes(self.buffer_before_minutes as i64),
            end: self.end + Duration::minutes(self.buffer_after_minutes as i64),
        }
    }
}

/// A fully specified, not-yet-committed booking proposal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateSlot {
    pub professional_id: Uuid,
    pub room_id: Option<Uuid>,
    pub service_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CandidateSlot {
    /// The candidate's span expanded by its service's buffers.
    pub fn expanded_interval(&self, constraints: &ServiceConstraints) -> TimeInterval {
        TimeInterval {
            start: self.start - constraints.buffer_before(),
            end: self.end + constraints.buffer_after(),
        }
    }
}

/// The durable outcome of a successful commit. Owned by the appointment
/// store thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingReservation {
    pub appointment_id: Uuid,
    pub professional_id: Uuid,
    pub room_id: Option<Uuid>,
    pub service_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: AppointmentStatus,
    /// Monotonically increasing commit counter; detects concurrent mutation.
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// INTERVALS AND DATE RANGES
// ==============================================================================

/// A half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Strict overlap: touching intervals do not overlap.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn intersect(&self, other: &TimeInterval) -> Option<TimeInterval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start < end {
            Some(TimeInterval { start, end })
        } else {
            None
        }
    }

    /// Remove `other` from this interval. An exclusion in the middle splits
    /// the interval in two; one covering it entirely leaves nothing.
    pub fn subtract(&self, other: &TimeInterval) -> Vec<TimeInterval> {
        if !self.overlaps(other) {
            return vec![*self];
        }

        let mut pieces = Vec::new();
        if self.start < other.start {
            pieces.push(TimeInterval {
                start: self.start,
                end: other.start,
            });
        }
        if other.end < self.end {
            pieces.push(TimeInterval {
                start: other.end,
                end: self.end,
            });
        }
        pieces
    }
}

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { from: date, to: date }
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        let to = self.to;
        self.from.iter_days().take_while(move |d| *d <= to)
    }
}

// ==============================================================================
// BOOKING OUTCOMES AND ERRORS
// ==============================================================================

/// Deterministic reasons a booking attempt is turned down.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    ResourceClosed,
    IneligibleResource,
    TooSoon,
    TooFar,
    SameDayDisallowed,
    Conflict,
    Cancelled,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::ResourceClosed => write!(f, "RESOURCE_CLOSED"),
            RejectionReason::IneligibleResource => write!(f, "INELIGIBLE_RESOURCE"),
            RejectionReason::TooSoon => write!(f, "TOO_SOON"),
            RejectionReason::TooFar => write!(f, "TOO_FAR"),
            RejectionReason::SameDayDisallowed => write!(f, "SAME_DAY_DISALLOWED"),
            RejectionReason::Conflict => write!(f, "CONFLICT"),
            RejectionReason::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Terminal result of a booking attempt. `alternatives` is populated only
/// for conflict rejections, freshly recomputed so callers can offer the
/// user immediate options instead of a bare failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BookingOutcome {
    Reserved(BookingReservation),
    Rejected {
        reason: RejectionReason,
        alternatives: Vec<CandidateSlot>,
    },
}

impl BookingOutcome {
    pub fn rejected(reason: RejectionReason) -> Self {
        BookingOutcome::Rejected {
            reason,
            alternatives: vec![],
        }
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self, BookingOutcome::Reserved(_))
    }
}

/// Booking attempt lifecycle, surfaced in tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingState {
    Requested,
    Validating,
    Reserved,
    Rejected,
}

impl fmt::Display for BookingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingState::Requested => write!(f, "requested"),
            BookingState::Validating => write!(f, "validating"),
            BookingState::Reserved => write!(f, "reserved"),
            BookingState::Rejected => write!(f, "rejected"),
        }
    }
}

/// Infrastructure failures. Deterministic rejections travel through
/// `BookingOutcome::Rejected` instead, since retrying them cannot succeed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulingError {
    #[error("upstream store unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("validation error: {0}")]
    Validation(String),
}
