mod availability;
mod calendar;
mod conflict;
mod coordinator;
mod error;
mod index;
mod journal;
mod lifecycle;
mod mutations;
mod queries;

pub use availability::{chop_slots, free_spans, merge_overlapping, subtract_intervals};
pub use calendar::DoctorCalendar;
pub use error::{EngineError, Entity};
pub use index::AvailabilityIndex;
pub use journal::{Journal, MemoryJournal, WalJournal};

use std::io;
use std::sync::Arc;

use ulid::Ulid;

use crate::config::EngineConfig;
use crate::directory::Directory;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

use calendar::{apply_event, Registry};
use coordinator::{CalendarLock, Coordinator};

pub struct Engine {
    coordinator: Coordinator,
    /// Reverse lookups: appointment → doctor, patient → appointments.
    registry: Arc<Registry>,
    journal: Arc<dyn Journal>,
    directory: Arc<dyn Directory>,
    pub notify: Arc<NotifyHub>,
    config: EngineConfig,
}

impl Engine {
    /// Open the WAL under `config.data_dir`, replay it and start the group-commit writer.
    /// Must be called inside a tokio runtime.
    pub fn open(config: EngineConfig, directory: Arc<dyn Directory>) -> io::Result<Self> {
        let path = config.wal_path();
        let events = Wal::replay(&path)?;
        let wal = Wal::open(&path)?;
        let journal = Arc::new(WalJournal::spawn(wal));
        let engine = Self::with_journal(config, directory, journal, &events);
        tracing::info!(
            "replayed {} events into {} calendars from {}",
            events.len(),
            engine.coordinator.len(),
            path.display()
        );
        Ok(engine)
    }

    /// Engine over a [`MemoryJournal`]. Nothing survives the process.
    pub fn in_memory(config: EngineConfig, directory: Arc<dyn Directory>) -> Self {
        Self::with_journal(config, directory, Arc::new(MemoryJournal::new()), &[])
    }

    /// Engine over any journal, starting from `history` (the journal's contents).
    pub fn with_journal(
        config: EngineConfig,
        directory: Arc<dyn Directory>,
        journal: Arc<dyn Journal>,
        history: &[Event],
    ) -> Self {
        let registry = Registry::default();
        let calendars = calendar::replay(history, &registry);
        Self {
            coordinator: Coordinator::new(calendars, config.lock_timeout),
            registry: Arc::new(registry),
            journal,
            directory,
            notify: Arc::new(NotifyHub::new()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Journal + apply + notify, then hand back the updated record.
    ///
    /// Runs on its own task holding the calendar lock: once the caller has the lock, dropping
    /// its future cannot leave the journal and the in-memory state disagreeing. Nothing is
    /// applied unless the append succeeded.
    pub(super) async fn commit(&self, mut cal: CalendarLock, event: Event) -> Result<Appointment, EngineError> {
        let journal = self.journal.clone();
        let registry = self.registry.clone();
        let notify = self.notify.clone();
        let task = tokio::spawn(async move {
            let id = event.appointment_id();
            if let Err(e) = journal.append(&event).await {
                tracing::warn!("journal append failed for appointment {id}: {e}");
                return Err(EngineError::WalError(e.to_string()));
            }
            apply_event(&mut cal, &event, &registry);
            notify.send(cal.doctor_id, &event);
            cal.appointments
                .get(&id)
                .cloned()
                .ok_or(EngineError::NotFound(Entity::Appointment, id))
        });
        task.await.map_err(|e| EngineError::Aborted(e.to_string()))?
    }

    /// Lookup appointment → doctor, acquire the doctor's lock, snapshot the record.
    pub(super) async fn resolve_write(
        &self,
        appointment_id: Ulid,
    ) -> Result<(CalendarLock, Appointment), EngineError> {
        let doctor_id = self
            .registry
            .doctor_of(&appointment_id)
            .ok_or(EngineError::NotFound(Entity::Appointment, appointment_id))?;
        let cal = self.coordinator.lock(doctor_id).await?;
        let appt = cal
            .appointments
            .get(&appointment_id)
            .cloned()
            .ok_or(EngineError::NotFound(Entity::Appointment, appointment_id))?;
        Ok((cal, appt))
    }

    /// Rebuild a doctor's index from its records. Returns the number of occupying intervals.
    /// Touches neither the records nor the journal, so repeating it changes nothing.
    pub async fn rebuild_index(&self, doctor_id: Ulid) -> Result<usize, EngineError> {
        if self.coordinator.get(&doctor_id).is_none() {
            return Ok(0);
        }
        let mut cal = self.coordinator.lock(doctor_id).await?;
        let indexed = cal.rebuild_index();
        tracing::info!("rebuilt index of doctor {doctor_id}: {indexed} occupying appointments");
        Ok(indexed)
    }

    /// Rewrite the journal as one `AppointmentBooked` per record. Returns the number of events
    /// written. Mutations wait while it runs.
    pub async fn compact_journal(&self) -> Result<usize, EngineError> {
        let _frozen = self.coordinator.freeze().await;
        let mut events = Vec::new();
        for doctor_id in self.coordinator.doctor_ids() {
            let Some(cal) = self.coordinator.read(&doctor_id).await else {
                continue;
            };
            let mut records: Vec<&Appointment> = cal.appointments.values().collect();
            records.sort_by_key(|a| a.id);
            events.extend(records.into_iter().map(|a| Event::AppointmentBooked {
                appointment: a.clone(),
            }));
        }
        let written = events.len();
        self.journal
            .compact(events)
            .await
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("compacted journal to {written} events");
        Ok(written)
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        self.journal.appends_since_compact().await
    }
}
