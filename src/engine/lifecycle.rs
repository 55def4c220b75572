use crate::model::*;

use super::EngineError;

pub(crate) fn check_transition(from: AppointmentStatus, to: AppointmentStatus) -> Result<(), EngineError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        tracing::debug!("rejected status transition {from} -> {to}");
        Err(EngineError::InvalidTransition { from, to })
    }
}

/// Event moving `appt` to `to`. Cancellation has its own event, see [`cancel_event`].
pub(crate) fn status_event(appt: &Appointment, to: AppointmentStatus, at: Ms) -> Result<Event, EngineError> {
    debug_assert!(to != AppointmentStatus::Cancelled);
    check_transition(appt.status, to)?;
    Ok(Event::StatusChanged {
        id: appt.id,
        doctor_id: appt.doctor_id,
        status: to,
        at,
    })
}

pub(crate) fn cancel_event(
    appt: &Appointment,
    reason: Option<String>,
    cancelled_by: CancelledBy,
    at: Ms,
) -> Result<Event, EngineError> {
    check_transition(appt.status, AppointmentStatus::Cancelled)?;
    Ok(Event::AppointmentCancelled {
        id: appt.id,
        doctor_id: appt.doctor_id,
        reason,
        cancelled_by,
        at,
    })
}

/// Rescheduling keeps the status, so it is checked as a self-transition of a status that
/// has not started yet.
pub(crate) fn check_reschedulable(appt: &Appointment) -> Result<(), EngineError> {
    if appt.status.is_reschedulable() {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            from: appt.status,
            to: appt.status,
        })
    }
}
