use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

pub const MINUTE: Ms = 60_000;
pub const HOUR: Ms = 60 * MINUTE;
pub const DAY: Ms = 24 * HOUR;

/// Returned when a span would have `start >= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRange {
    pub start: Ms,
    pub end: Ms,
}

impl std::fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid range [{}, {}): start must be before end", self.start, self.end)
    }
}

impl std::error::Error for InvalidRange {}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Fallible constructor for spans coming from callers.
    pub fn checked(start: Ms, end: Ms) -> Result<Self, InvalidRange> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(InvalidRange { start, end })
        }
    }

    pub fn duration(&self) -> Result<Ms, InvalidRange> {
        if self.start < self.end {
            Ok(self.end - self.start)
        } else {
            Err(InvalidRange {
                start: self.start,
                end: self.end,
            })
        }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection of two spans, `None` if they do not overlap.
    pub fn clamp_to(&self, bounds: &Span) -> Option<Span> {
        let start = self.start.max(bounds.start);
        let end = self.end.min(bounds.end);
        (start < end).then_some(Span { start, end })
    }
}

/// Lifecycle of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Requested,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 6] = [
        AppointmentStatus::Requested,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    /// Statuses an appointment may move to from `self`.
    pub fn next_states(self) -> &'static [AppointmentStatus] {
        use AppointmentStatus::*;
        match self {
            Requested => &[Confirmed, Cancelled],
            Confirmed => &[InProgress, Cancelled, NoShow],
            InProgress => &[Completed, NoShow],
            Completed | Cancelled | NoShow => &[],
        }
    }

    pub fn can_transition_to(self, to: AppointmentStatus) -> bool {
        self.next_states().contains(&to)
    }

    /// Whether an appointment in this status reserves the doctor's time.
    pub fn occupies_calendar(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Requested | AppointmentStatus::Confirmed | AppointmentStatus::InProgress
        )
    }

    pub fn is_terminal(self) -> bool {
        self.next_states().is_empty()
    }

    /// Only appointments that have not started can move to another time.
    pub fn is_reschedulable(self) -> bool {
        matches!(self, AppointmentStatus::Requested | AppointmentStatus::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Requested => "requested",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the consultation takes place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentKind {
    #[default]
    Telehealth,
    InPerson,
    Phone,
}

/// Who cancelled an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelledBy {
    Patient,
    Doctor,
    System,
}

/// The appointment record: the system of record everything the index derives from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub doctor_id: Ulid,
    pub patient_id: Ulid,
    pub span: Span,
    pub status: AppointmentStatus,
    pub kind: AppointmentKind,
    pub reason: Option<String>,
    pub urgent: bool,
    pub created_at: Ms,
    pub updated_at: Ms,
    pub actual_start: Option<Ms>,
    pub actual_end: Option<Ms>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<CancelledBy>,
    pub cancelled_at: Option<Ms>,
}

impl Appointment {
    pub fn occupies_calendar(&self) -> bool {
        self.status.occupies_calendar()
    }
}

/// Input for a booking. Only doctor, patient and span are required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub doctor_id: Ulid,
    pub patient_id: Ulid,
    pub span: Span,
    pub kind: AppointmentKind,
    pub reason: Option<String>,
    pub urgent: bool,
}

impl BookingRequest {
    pub fn new(doctor_id: Ulid, patient_id: Ulid, span: Span) -> Self {
        Self {
            doctor_id,
            patient_id,
            span,
            kind: AppointmentKind::default(),
            reason: None,
            urgent: false,
        }
    }

    pub fn kind(mut self, kind: AppointmentKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn urgent(mut self, urgent: bool) -> Self {
        self.urgent = urgent;
        self
    }
}

/// Flat event types, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Carries the whole record; compaction re-emits one per live appointment.
    AppointmentBooked { appointment: Appointment },
    AppointmentRescheduled {
        id: Ulid,
        doctor_id: Ulid,
        span: Span,
        at: Ms,
    },
    StatusChanged {
        id: Ulid,
        doctor_id: Ulid,
        status: AppointmentStatus,
        at: Ms,
    },
    AppointmentCancelled {
        id: Ulid,
        doctor_id: Ulid,
        reason: Option<String>,
        cancelled_by: CancelledBy,
        at: Ms,
    },
}

impl Event {
    pub fn appointment_id(&self) -> Ulid {
        match self {
            Event::AppointmentBooked { appointment } => appointment.id,
            Event::AppointmentRescheduled { id, .. }
            | Event::StatusChanged { id, .. }
            | Event::AppointmentCancelled { id, .. } => *id,
        }
    }

    pub fn doctor_id(&self) -> Ulid {
        match self {
            Event::AppointmentBooked { appointment } => appointment.doctor_id,
            Event::AppointmentRescheduled { doctor_id, .. }
            | Event::StatusChanged { doctor_id, .. }
            | Event::AppointmentCancelled { doctor_id, .. } => *doctor_id,
        }
    }
}

// ── Query types ──────────────────────────────────────────────────

/// Narrows appointment listings. Empty filter matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    /// Keep appointments whose span overlaps this window.
    pub window: Option<Span>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.status.is_none_or(|s| appointment.status == s)
            && self.window.is_none_or(|w| appointment.span.overlaps(&w))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoctorStats {
    pub total: usize,
    /// Requested, confirmed or in progress.
    pub occupying: usize,
    /// Occupying and starting after `now`.
    pub upcoming: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub no_show: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert_eq!(s.duration(), Ok(100));
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_contains_span() {
        let outer = Span::new(100, 400);
        let inner = Span::new(150, 300);
        let partial = Span::new(50, 200);
        assert!(outer.contains_span(&inner));
        assert!(outer.contains_span(&outer)); // self-containment
        assert!(!outer.contains_span(&partial));
    }

    #[test]
    fn checked_rejects_empty_and_inverted() {
        assert_eq!(Span::checked(5, 5), Err(InvalidRange { start: 5, end: 5 }));
        assert_eq!(Span::checked(9, 3), Err(InvalidRange { start: 9, end: 3 }));
        assert_eq!(Span::checked(3, 9), Ok(Span::new(3, 9)));
    }

    #[test]
    fn duration_of_malformed_span_fails() {
        // Fields are public, so a caller can build one without the constructor.
        let bad = Span { start: 10, end: 10 };
        assert!(bad.duration().is_err());
    }

    #[test]
    fn clamp_to_bounds() {
        let s = Span::new(100, 300);
        assert_eq!(s.clamp_to(&Span::new(200, 400)), Some(Span::new(200, 300)));
        assert_eq!(s.clamp_to(&Span::new(300, 400)), None);
    }

    #[test]
    fn transition_table() {
        use AppointmentStatus::*;
        let allowed = [
            (Requested, Confirmed),
            (Requested, Cancelled),
            (Confirmed, InProgress),
            (Confirmed, Cancelled),
            (Confirmed, NoShow),
            (InProgress, Completed),
            (InProgress, NoShow),
        ];
        for from in AppointmentStatus::ALL {
            for to in AppointmentStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for s in AppointmentStatus::ALL {
            assert_eq!(s.is_terminal(), !s.occupies_calendar());
        }
    }

    #[test]
    fn filter_matches_status_and_window() {
        let appt = Appointment {
            id: Ulid::new(),
            doctor_id: Ulid::new(),
            patient_id: Ulid::new(),
            span: Span::new(1000, 2000),
            status: AppointmentStatus::Confirmed,
            kind: AppointmentKind::InPerson,
            reason: None,
            urgent: false,
            created_at: 0,
            updated_at: 0,
            actual_start: None,
            actual_end: None,
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
        };
        assert!(AppointmentFilter::default().matches(&appt));
        let by_status = AppointmentFilter {
            status: Some(AppointmentStatus::Requested),
            window: None,
        };
        assert!(!by_status.matches(&appt));
        let by_window = AppointmentFilter {
            status: None,
            window: Some(Span::new(2000, 3000)),
        };
        assert!(!by_window.matches(&appt));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::AppointmentCancelled {
            id: Ulid::new(),
            doctor_id: Ulid::new(),
            reason: Some("travel".into()),
            cancelled_by: CancelledBy::Patient,
            at: 42,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
