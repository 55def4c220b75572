use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use super::calendar::DoctorCalendar;
use super::EngineError;
use crate::observability::{CALENDARS_ACTIVE, LOCK_TIMEOUTS_TOTAL, LOCK_WAIT_SECONDS};

pub type SharedCalendar = Arc<RwLock<DoctorCalendar>>;
pub type CalendarReadGuard = OwnedRwLockReadGuard<DoctorCalendar>;

/// Exclusive hold on one doctor's calendar: the critical section of a mutation.
///
/// Also holds the shared side of the commit gate, so journal compaction never runs while
/// any critical section is open.
pub struct CalendarLock {
    guard: OwnedRwLockWriteGuard<DoctorCalendar>,
    _gate: OwnedRwLockReadGuard<()>,
}

impl Deref for CalendarLock {
    type Target = DoctorCalendar;

    fn deref(&self) -> &DoctorCalendar {
        &self.guard
    }
}

impl DerefMut for CalendarLock {
    fn deref_mut(&mut self) -> &mut DoctorCalendar {
        &mut self.guard
    }
}

/// One lock per doctor.
///
/// tokio's `RwLock` queues waiters first-in first-out, so a steady stream of requests for a
/// busy doctor cannot starve an earlier one. Writers wait at most `lock_timeout`.
pub struct Coordinator {
    calendars: DashMap<Ulid, SharedCalendar>,
    gate: Arc<RwLock<()>>,
    lock_timeout: Duration,
}

impl Coordinator {
    pub fn new(calendars: impl IntoIterator<Item = DoctorCalendar>, lock_timeout: Duration) -> Self {
        let map: DashMap<Ulid, SharedCalendar> = calendars
            .into_iter()
            .map(|cal| (cal.doctor_id, Arc::new(RwLock::new(cal))))
            .collect();
        metrics::gauge!(CALENDARS_ACTIVE).set(map.len() as f64);
        Self {
            calendars: map,
            gate: Arc::new(RwLock::new(())),
            lock_timeout,
        }
    }

    pub fn get(&self, doctor_id: &Ulid) -> Option<SharedCalendar> {
        self.calendars.get(doctor_id).map(|e| e.value().clone())
    }

    /// Calendar of `doctor_id`, created empty on first use.
    pub fn get_or_create(&self, doctor_id: Ulid) -> SharedCalendar {
        if let Some(cal) = self.get(&doctor_id) {
            return cal;
        }
        let cal = self
            .calendars
            .entry(doctor_id)
            .or_insert_with(|| Arc::new(RwLock::new(DoctorCalendar::new(doctor_id))))
            .value()
            .clone();
        metrics::gauge!(CALENDARS_ACTIVE).set(self.calendars.len() as f64);
        cal
    }

    pub fn doctor_ids(&self) -> Vec<Ulid> {
        self.calendars.iter().map(|e| *e.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.calendars.len()
    }

    /// Exclusive access to a doctor's calendar, waiting at most `lock_timeout`.
    pub async fn lock(&self, doctor_id: Ulid) -> Result<CalendarLock, EngineError> {
        let cal = self.get_or_create(doctor_id);
        let gate = self.gate.clone();
        let started = Instant::now();
        let acquire = async move {
            let gate = gate.read_owned().await;
            let guard = cal.write_owned().await;
            CalendarLock { guard, _gate: gate }
        };
        match tokio::time::timeout(self.lock_timeout, acquire).await {
            Ok(lock) => {
                metrics::histogram!(LOCK_WAIT_SECONDS).record(started.elapsed().as_secs_f64());
                Ok(lock)
            }
            Err(_) => {
                metrics::counter!(LOCK_TIMEOUTS_TOTAL).increment(1);
                tracing::warn!(
                    "lock timeout for doctor {doctor_id} after {}ms",
                    self.lock_timeout.as_millis()
                );
                Err(EngineError::LockTimeout(doctor_id))
            }
        }
    }

    /// Shared access for readers. `None` if the doctor has no calendar yet.
    pub async fn read(&self, doctor_id: &Ulid) -> Option<CalendarReadGuard> {
        let cal = self.get(doctor_id)?;
        Some(cal.read_owned().await)
    }

    /// Wait for every open critical section to finish and keep new ones out until the
    /// returned guard drops.
    pub async fn freeze(&self) -> OwnedRwLockWriteGuard<()> {
        self.gate.clone().write_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_doctor_times_out_while_held() {
        let coord = Coordinator::new(Vec::new(), Duration::from_millis(20));
        let doctor = Ulid::new();
        let held = coord.lock(doctor).await.unwrap();
        let second = coord.lock(doctor).await;
        assert!(matches!(second, Err(EngineError::LockTimeout(d)) if d == doctor));
        drop(held);
        assert!(coord.lock(doctor).await.is_ok());
    }

    #[tokio::test]
    async fn different_doctors_do_not_contend() {
        let coord = Coordinator::new(Vec::new(), Duration::from_millis(20));
        let _a = coord.lock(Ulid::new()).await.unwrap();
        let _b = coord.lock(Ulid::new()).await.unwrap();
        assert_eq!(coord.len(), 2);
    }

    #[tokio::test]
    async fn waiters_acquire_in_arrival_order() {
        let coord = Arc::new(Coordinator::new(Vec::new(), Duration::from_secs(5)));
        let doctor = Ulid::new();
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let held = coord.lock(doctor).await.unwrap();
        let mut handles = Vec::new();
        for i in 0..5 {
            let coord = coord.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _lock = coord.lock(doctor).await.unwrap();
                order.lock().await.push(i);
            }));
            // Let waiter i enqueue before waiter i + 1 is spawned.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(held);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn freeze_blocks_new_critical_sections() {
        let coord = Coordinator::new(Vec::new(), Duration::from_millis(20));
        let frozen = coord.freeze().await;
        assert!(matches!(coord.lock(Ulid::new()).await, Err(EngineError::LockTimeout(_))));
        drop(frozen);
        assert!(coord.lock(Ulid::new()).await.is_ok());
    }

    #[tokio::test]
    async fn read_missing_calendar_is_none() {
        let coord = Coordinator::new(Vec::new(), Duration::from_millis(20));
        assert!(coord.read(&Ulid::new()).await.is_none());
    }
}
