use std::collections::HashMap;

use dashmap::DashMap;
use ulid::Ulid;

use super::index::AvailabilityIndex;
use crate::model::*;

/// Everything the engine keeps about one doctor: the appointment records (source of truth)
/// and the index derived from them.
#[derive(Debug, Clone)]
pub struct DoctorCalendar {
    pub doctor_id: Ulid,
    pub appointments: HashMap<Ulid, Appointment>,
    pub index: AvailabilityIndex,
}

impl DoctorCalendar {
    pub fn new(doctor_id: Ulid) -> Self {
        Self {
            doctor_id,
            appointments: HashMap::new(),
            index: AvailabilityIndex::new(),
        }
    }

    /// Rebuild the index from the occupying records. Returns the number indexed.
    pub fn rebuild_index(&mut self) -> usize {
        self.index = AvailabilityIndex::rebuild(
            self.appointments
                .values()
                .filter(|a| a.occupies_calendar())
                .map(|a| (a.id, a.span)),
        );
        self.index.len()
    }

    /// Records matching `filter`, sorted by start.
    pub fn matching(&self, filter: &AppointmentFilter) -> Vec<Appointment> {
        let mut out: Vec<Appointment> = self
            .appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        out.sort_by_key(|a| (a.span.start, a.id));
        out
    }
}

/// Cross-doctor lookups maintained alongside the calendars.
#[derive(Default)]
pub struct Registry {
    /// appointment id → doctor id
    pub appointment_doctor: DashMap<Ulid, Ulid>,
    /// patient id → appointment ids
    pub patient_appointments: DashMap<Ulid, Vec<Ulid>>,
}

impl Registry {
    pub fn doctor_of(&self, appointment_id: &Ulid) -> Option<Ulid> {
        self.appointment_doctor.get(appointment_id).map(|e| *e.value())
    }

    pub fn appointments_of_patient(&self, patient_id: &Ulid) -> Vec<Ulid> {
        self.patient_appointments
            .get(patient_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    fn track(&self, appointment: &Appointment) {
        if self
            .appointment_doctor
            .insert(appointment.id, appointment.doctor_id)
            .is_none()
        {
            self.patient_appointments
                .entry(appointment.patient_id)
                .or_default()
                .push(appointment.id);
        }
    }
}

/// Apply an event to a calendar. No locking: the caller holds the calendar lock.
///
/// Keeps the index in step with the records: an appointment is indexed exactly while its
/// status occupies the calendar.
pub fn apply_event(cal: &mut DoctorCalendar, event: &Event, registry: &Registry) {
    match event {
        Event::AppointmentBooked { appointment } => {
            registry.track(appointment);
            if appointment.occupies_calendar() {
                cal.index.insert(appointment.span, appointment.id);
            } else {
                cal.index.remove(&appointment.id);
            }
            cal.appointments.insert(appointment.id, appointment.clone());
        }
        Event::AppointmentRescheduled { id, span, at, .. } => {
            if let Some(appt) = cal.appointments.get_mut(id) {
                appt.span = *span;
                appt.updated_at = *at;
                if appt.occupies_calendar() {
                    cal.index.replace(id, *span);
                }
            }
        }
        Event::StatusChanged { id, status, at, .. } => {
            if let Some(appt) = cal.appointments.get_mut(id) {
                appt.status = *status;
                appt.updated_at = *at;
                match status {
                    AppointmentStatus::InProgress => appt.actual_start = Some(*at),
                    AppointmentStatus::Completed => appt.actual_end = Some(*at),
                    _ => {}
                }
                if !status.occupies_calendar() {
                    cal.index.remove(id);
                }
            }
        }
        Event::AppointmentCancelled {
            id,
            reason,
            cancelled_by,
            at,
            ..
        } => {
            if let Some(appt) = cal.appointments.get_mut(id) {
                appt.status = AppointmentStatus::Cancelled;
                appt.updated_at = *at;
                appt.cancellation_reason = reason.clone();
                appt.cancelled_by = Some(*cancelled_by);
                appt.cancelled_at = Some(*at);
            }
            cal.index.remove(id);
        }
    }
}

/// Rebuild calendars from a replayed history.
pub fn replay(events: &[Event], registry: &Registry) -> Vec<DoctorCalendar> {
    let mut calendars: HashMap<Ulid, DoctorCalendar> = HashMap::new();
    for event in events {
        let doctor_id = event.doctor_id();
        let cal = calendars
            .entry(doctor_id)
            .or_insert_with(|| DoctorCalendar::new(doctor_id));
        apply_event(cal, event, registry);
    }
    calendars.into_values().collect()
}
