use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use ulid::Ulid;

use crate::model::{MINUTE, Ms};
use crate::policy::WorkingHours;

/// What the engine needs to know about a doctor. Owned by the profile service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorProfile {
    pub id: Ulid,
    pub specialty: Option<String>,
    pub accepting_patients: bool,
    pub working_hours: WorkingHours,
    /// Default consultation length, used for slot listings.
    pub consultation_ms: Ms,
}

impl DoctorProfile {
    pub fn new(id: Ulid, working_hours: WorkingHours) -> Self {
        Self {
            id,
            specialty: None,
            accepting_patients: true,
            working_hours,
            consultation_ms: 30 * MINUTE,
        }
    }
}

/// Read-only view of the identity/profile collaborator.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_doctor(&self, doctor_id: Ulid) -> Option<DoctorProfile>;
    async fn patient_exists(&self, patient_id: Ulid) -> bool;
}

/// Directory backed by concurrent maps. Used when embedding the engine and in tests.
#[derive(Default)]
pub struct InMemoryDirectory {
    doctors: DashMap<Ulid, DoctorProfile>,
    patients: DashSet<Ulid>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_doctor(&self, profile: DoctorProfile) {
        self.doctors.insert(profile.id, profile);
    }

    pub fn set_accepting(&self, doctor_id: &Ulid, accepting: bool) -> bool {
        match self.doctors.get_mut(doctor_id) {
            Some(mut profile) => {
                profile.accepting_patients = accepting;
                true
            }
            None => false,
        }
    }

    pub fn add_patient(&self, patient_id: Ulid) {
        self.patients.insert(patient_id);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn get_doctor(&self, doctor_id: Ulid) -> Option<DoctorProfile> {
        self.doctors.get(&doctor_id).map(|e| e.value().clone())
    }

    async fn patient_exists(&self, patient_id: Ulid) -> bool {
        self.patients.contains(&patient_id)
    }
}
