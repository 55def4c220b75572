use ulid::Ulid;

use crate::model::{AppointmentStatus, InvalidRange, Ms, Span};

/// Which kind of record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Appointment,
    Doctor,
    Patient,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Entity::Appointment => "appointment",
            Entity::Doctor => "doctor",
            Entity::Patient => "patient",
        })
    }
}

#[derive(Debug)]
pub enum EngineError {
    InvalidRange { start: Ms, end: Ms },
    OutsideWorkingHours(Span),
    /// Ids of the occupying appointments the requested span collides with.
    SlotConflict(Vec<Ulid>),
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    NotFound(Entity, Ulid),
    LockTimeout(Ulid),
    NotAcceptingPatients(Ulid),
    CancellationWindowClosed { starts_at: Ms, notice: Ms },
    InvalidSlotDuration(Ms),
    LimitExceeded(&'static str),
    WalError(String),
    /// The commit task died before reporting back.
    Aborted(String),
}

impl From<InvalidRange> for EngineError {
    fn from(e: InvalidRange) -> Self {
        EngineError::InvalidRange {
            start: e.start,
            end: e.end,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid range [{start}, {end}): start must be before end")
            }
            EngineError::OutsideWorkingHours(span) => {
                write!(f, "[{}, {}) is outside working hours", span.start, span.end)
            }
            EngineError::SlotConflict(ids) => {
                let ids: Vec<String> = ids.iter().map(Ulid::to_string).collect();
                write!(f, "slot conflicts with appointment(s): {}", ids.join(", "))
            }
            EngineError::InvalidTransition { from, to } if from == to => {
                write!(f, "cannot reschedule a {from} appointment")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition: {from} -> {to}")
            }
            EngineError::NotFound(entity, id) => write!(f, "{entity} not found: {id}"),
            EngineError::LockTimeout(doctor) => {
                write!(f, "timed out waiting for calendar lock of doctor {doctor}")
            }
            EngineError::NotAcceptingPatients(doctor) => {
                write!(f, "doctor {doctor} is not accepting patients")
            }
            EngineError::CancellationWindowClosed { starts_at, notice } => write!(
                f,
                "appointment starting at {starts_at} can no longer be cancelled ({notice}ms notice required)"
            ),
            EngineError::InvalidSlotDuration(ms) => write!(f, "invalid slot duration: {ms}ms"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
            EngineError::Aborted(e) => write!(f, "commit aborted: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
