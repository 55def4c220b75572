use std::collections::HashMap;
use std::time::Instant;

use ulid::Ulid;

use crate::directory::DoctorProfile;
use crate::limits::{MAX_SLOTS_PER_QUERY, MIN_SLOT_DURATION_MS};
use crate::model::*;
use crate::observability::record_operation;

use super::availability::{chop_slots, free_spans};
use super::conflict::validate_window;
use super::{Engine, EngineError, Entity};

impl Engine {
    /// Ids of the occupying appointments of `doctor_id` overlapping `span`.
    pub async fn query_overlap(&self, doctor_id: Ulid, span: Span) -> Result<Vec<Ulid>, EngineError> {
        span.duration()?;
        Ok(match self.coordinator.read(&doctor_id).await {
            Some(cal) => cal.index.query_overlap(&span),
            None => Vec::new(),
        })
    }

    /// Bookable slots of `slot_duration` inside `window`: working hours minus occupying
    /// appointments, cut from the start of every free stretch. Partial tails are dropped.
    pub async fn list_available_slots(
        &self,
        doctor_id: Ulid,
        window: Span,
        slot_duration: Ms,
    ) -> Result<Vec<Span>, EngineError> {
        let started = Instant::now();
        let result = async {
            if slot_duration < MIN_SLOT_DURATION_MS {
                return Err(EngineError::InvalidSlotDuration(slot_duration));
            }
            let doctor = self.doctor(doctor_id).await?;
            self.slots_for(&doctor, window, slot_duration).await
        }
        .await;
        record_operation("list_slots", started, &result);
        result
    }

    /// Slots sized by the doctor's own consultation length.
    pub async fn list_consultation_slots(&self, doctor_id: Ulid, window: Span) -> Result<Vec<Span>, EngineError> {
        let doctor = self.doctor(doctor_id).await?;
        if doctor.consultation_ms < MIN_SLOT_DURATION_MS {
            return Err(EngineError::InvalidSlotDuration(doctor.consultation_ms));
        }
        self.slots_for(&doctor, window, doctor.consultation_ms).await
    }

    async fn doctor(&self, doctor_id: Ulid) -> Result<DoctorProfile, EngineError> {
        self.directory
            .get_doctor(doctor_id)
            .await
            .ok_or(EngineError::NotFound(Entity::Doctor, doctor_id))
    }

    async fn slots_for(&self, doctor: &DoctorProfile, window: Span, slot: Ms) -> Result<Vec<Span>, EngineError> {
        validate_window(&window)?;
        if !doctor.accepting_patients {
            return Ok(Vec::new());
        }
        let working = doctor.working_hours.spans_within(&window);
        if working.is_empty() {
            return Ok(Vec::new());
        }
        let occupied = match self.coordinator.read(&doctor.id).await {
            Some(cal) => cal.index.occupied_within(&window),
            None => Vec::new(),
        };
        let free = free_spans(&working, &occupied);
        Ok(chop_slots(&free, slot, MAX_SLOTS_PER_QUERY))
    }

    pub async fn get_appointment(&self, appointment_id: &Ulid) -> Option<Appointment> {
        let doctor_id = self.registry.doctor_of(appointment_id)?;
        let cal = self.coordinator.read(&doctor_id).await?;
        cal.appointments.get(appointment_id).cloned()
    }

    /// A doctor's appointments matching `filter`, sorted by start.
    pub async fn doctor_appointments(&self, doctor_id: Ulid, filter: AppointmentFilter) -> Vec<Appointment> {
        match self.coordinator.read(&doctor_id).await {
            Some(cal) => cal.matching(&filter),
            None => Vec::new(),
        }
    }

    /// A patient's appointments across all doctors matching `filter`, sorted by start.
    pub async fn patient_appointments(&self, patient_id: Ulid, filter: AppointmentFilter) -> Vec<Appointment> {
        let mut by_doctor: HashMap<Ulid, Vec<Ulid>> = HashMap::new();
        for id in self.registry.appointments_of_patient(&patient_id) {
            if let Some(doctor_id) = self.registry.doctor_of(&id) {
                by_doctor.entry(doctor_id).or_default().push(id);
            }
        }

        let mut out = Vec::new();
        for (doctor_id, ids) in by_doctor {
            let Some(cal) = self.coordinator.read(&doctor_id).await else {
                continue;
            };
            out.extend(
                ids.iter()
                    .filter_map(|id| cal.appointments.get(id))
                    .filter(|a| filter.matches(a))
                    .cloned(),
            );
        }
        out.sort_by_key(|a| (a.span.start, a.id));
        out
    }

    pub async fn doctor_stats(&self, doctor_id: Ulid, now: Ms) -> DoctorStats {
        let mut stats = DoctorStats::default();
        let Some(cal) = self.coordinator.read(&doctor_id).await else {
            return stats;
        };
        for appt in cal.appointments.values() {
            stats.total += 1;
            if appt.occupies_calendar() {
                stats.occupying += 1;
                if appt.span.start > now {
                    stats.upcoming += 1;
                }
            }
            match appt.status {
                AppointmentStatus::Completed => stats.completed += 1,
                AppointmentStatus::Cancelled => stats.cancelled += 1,
                AppointmentStatus::NoShow => stats.no_show += 1,
                _ => {}
            }
        }
        stats
    }
}
