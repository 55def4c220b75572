use std::time::Instant;

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::record_operation;

use super::conflict::{check_no_conflict, now_ms, validate_span};
use super::lifecycle::{cancel_event, check_reschedulable, status_event};
use super::{Engine, EngineError, Entity};

fn check_reason(reason: Option<&str>) -> Result<(), EngineError> {
    if reason.is_some_and(|r| r.len() > MAX_REASON_LEN) {
        return Err(EngineError::LimitExceeded("reason too long"));
    }
    Ok(())
}

impl Engine {
    /// Book `span` with `doctor_id` for `patient_id`. The new appointment starts `requested`.
    pub async fn book(&self, doctor_id: Ulid, patient_id: Ulid, span: Span) -> Result<Appointment, EngineError> {
        self.book_request(BookingRequest::new(doctor_id, patient_id, span)).await
    }

    pub async fn book_request(&self, req: BookingRequest) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self.book_inner(req).await;
        record_operation("book", started, &result);
        result
    }

    async fn book_inner(&self, req: BookingRequest) -> Result<Appointment, EngineError> {
        validate_span(&req.span)?;
        check_reason(req.reason.as_deref())?;

        let doctor = self
            .directory
            .get_doctor(req.doctor_id)
            .await
            .ok_or(EngineError::NotFound(Entity::Doctor, req.doctor_id))?;
        if !doctor.accepting_patients {
            return Err(EngineError::NotAcceptingPatients(req.doctor_id));
        }
        if !self.directory.patient_exists(req.patient_id).await {
            return Err(EngineError::NotFound(Entity::Patient, req.patient_id));
        }
        if !doctor.working_hours.covers(&req.span) {
            return Err(EngineError::OutsideWorkingHours(req.span));
        }

        // Advisory: reject obvious conflicts without queueing on the lock. A busy lock just
        // skips the pre-check.
        if let Some(shared) = self.coordinator.get(&req.doctor_id)
            && let Ok(cal) = shared.try_read()
        {
            check_no_conflict(&cal.index, &req.span, None, "precheck")?;
        }

        let cal = self.coordinator.lock(req.doctor_id).await?;
        if cal.appointments.len() >= MAX_APPOINTMENTS_PER_DOCTOR {
            return Err(EngineError::LimitExceeded("too many appointments for doctor"));
        }
        check_no_conflict(&cal.index, &req.span, None, "commit")?;

        let now = now_ms();
        let appointment = Appointment {
            id: Ulid::new(),
            doctor_id: req.doctor_id,
            patient_id: req.patient_id,
            span: req.span,
            status: AppointmentStatus::Requested,
            kind: req.kind,
            reason: req.reason,
            urgent: req.urgent,
            created_at: now,
            updated_at: now,
            actual_start: None,
            actual_end: None,
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
        };
        let booked = self
            .commit(cal, Event::AppointmentBooked { appointment })
            .await?;
        tracing::info!(
            "booked appointment {} with doctor {} [{}, {})",
            booked.id,
            booked.doctor_id,
            booked.span.start,
            booked.span.end
        );
        Ok(booked)
    }

    /// Move a requested or confirmed appointment to `new_span`, keeping its status.
    pub async fn reschedule(&self, appointment_id: Ulid, new_span: Span) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self.reschedule_inner(appointment_id, new_span).await;
        record_operation("reschedule", started, &result);
        result
    }

    async fn reschedule_inner(&self, appointment_id: Ulid, new_span: Span) -> Result<Appointment, EngineError> {
        validate_span(&new_span)?;
        let doctor_id = self
            .registry
            .doctor_of(&appointment_id)
            .ok_or(EngineError::NotFound(Entity::Appointment, appointment_id))?;

        // Same range: nothing to write. A busy calendar falls through to the bounded lock.
        if let Some(shared) = self.coordinator.get(&doctor_id)
            && let Ok(cal) = shared.try_read()
            && let Some(current) = cal.appointments.get(&appointment_id)
            && current.span == new_span
        {
            check_reschedulable(current)?;
            return Ok(current.clone());
        }

        let doctor = self
            .directory
            .get_doctor(doctor_id)
            .await
            .ok_or(EngineError::NotFound(Entity::Doctor, doctor_id))?;
        if !doctor.working_hours.covers(&new_span) {
            return Err(EngineError::OutsideWorkingHours(new_span));
        }

        let (cal, appt) = self.resolve_write(appointment_id).await?;
        check_reschedulable(&appt)?;
        if appt.span == new_span {
            return Ok(appt);
        }
        check_no_conflict(&cal.index, &new_span, Some(&appointment_id), "commit")?;

        let event = Event::AppointmentRescheduled {
            id: appointment_id,
            doctor_id,
            span: new_span,
            at: now_ms(),
        };
        let moved = self.commit(cal, event).await?;
        tracing::info!(
            "rescheduled appointment {appointment_id} [{}, {}) -> [{}, {})",
            appt.span.start,
            appt.span.end,
            new_span.start,
            new_span.end
        );
        Ok(moved)
    }

    /// Cancel on behalf of the patient.
    pub async fn cancel(&self, appointment_id: Ulid, reason: Option<String>) -> Result<Appointment, EngineError> {
        self.cancel_by(appointment_id, reason, CancelledBy::Patient).await
    }

    pub async fn cancel_by(
        &self,
        appointment_id: Ulid,
        reason: Option<String>,
        cancelled_by: CancelledBy,
    ) -> Result<Appointment, EngineError> {
        let started = Instant::now();
        let result = self.cancel_inner(appointment_id, reason, cancelled_by).await;
        record_operation("cancel", started, &result);
        result
    }

    async fn cancel_inner(
        &self,
        appointment_id: Ulid,
        reason: Option<String>,
        cancelled_by: CancelledBy,
    ) -> Result<Appointment, EngineError> {
        check_reason(reason.as_deref())?;
        let (cal, appt) = self.resolve_write(appointment_id).await?;
        let now = now_ms();
        let event = cancel_event(&appt, reason, cancelled_by, now)?;
        if let Some(notice) = self.config.min_cancel_notice
            && now > appt.span.start - notice
        {
            return Err(EngineError::CancellationWindowClosed {
                starts_at: appt.span.start,
                notice,
            });
        }
        let cancelled = self.commit(cal, event).await?;
        tracing::info!("cancelled appointment {appointment_id} (by {cancelled_by:?})");
        Ok(cancelled)
    }

    pub async fn confirm(&self, appointment_id: Ulid) -> Result<Appointment, EngineError> {
        self.transition(appointment_id, AppointmentStatus::Confirmed).await
    }

    /// Mark the consultation as begun; records `actual_start`.
    pub async fn start(&self, appointment_id: Ulid) -> Result<Appointment, EngineError> {
        self.transition(appointment_id, AppointmentStatus::InProgress).await
    }

    /// Records `actual_end`.
    pub async fn complete(&self, appointment_id: Ulid) -> Result<Appointment, EngineError> {
        self.transition(appointment_id, AppointmentStatus::Completed).await
    }

    pub async fn mark_no_show(&self, appointment_id: Ulid) -> Result<Appointment, EngineError> {
        self.transition(appointment_id, AppointmentStatus::NoShow).await
    }

    /// Move an appointment to `to`. A move to `Cancelled` is a system cancellation.
    pub async fn transition(&self, appointment_id: Ulid, to: AppointmentStatus) -> Result<Appointment, EngineError> {
        if to == AppointmentStatus::Cancelled {
            return self.cancel_by(appointment_id, None, CancelledBy::System).await;
        }
        let started = Instant::now();
        let result = self.transition_inner(appointment_id, to).await;
        record_operation("transition", started, &result);
        result
    }

    async fn transition_inner(&self, appointment_id: Ulid, to: AppointmentStatus) -> Result<Appointment, EngineError> {
        let (cal, appt) = self.resolve_write(appointment_id).await?;
        let event = status_event(&appt, to, now_ms())?;
        let updated = self.commit(cal, event).await?;
        tracing::info!("appointment {appointment_id}: {} -> {to}", appt.status);
        Ok(updated)
    }
}
