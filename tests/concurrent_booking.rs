use std::sync::Arc;

use proptest::prelude::*;
use ulid::Ulid;

use slotwise::config::EngineConfig;
use slotwise::directory::{DoctorProfile, InMemoryDirectory};
use slotwise::engine::{Engine, EngineError};
use slotwise::model::*;
use slotwise::policy::{Weekday, WorkingHours};

/// 2025-01-06, a Monday.
const MONDAY: Ms = 20_094 * DAY;
const OPEN: Ms = MONDAY + 8 * HOUR;
const CLOSE: Ms = MONDAY + 18 * HOUR;
const SLOT: Ms = 15 * MINUTE;
const DOCTORS: usize = 3;

struct Clinic {
    engine: Arc<Engine>,
    doctors: Vec<Ulid>,
    directory: Arc<InMemoryDirectory>,
}

fn clinic(doctors: usize) -> Clinic {
    let directory = Arc::new(InMemoryDirectory::new());
    let hours = WorkingHours::uniform(&[Weekday::Monday], 8 * 60, 18 * 60).unwrap();
    let doctors: Vec<Ulid> = (0..doctors)
        .map(|_| {
            let id = Ulid::new();
            directory.upsert_doctor(DoctorProfile::new(id, hours.clone()));
            id
        })
        .collect();
    let engine = Arc::new(Engine::in_memory(EngineConfig::default(), directory.clone()));
    Clinic {
        engine,
        doctors,
        directory,
    }
}

impl Clinic {
    fn patient(&self) -> Ulid {
        let id = Ulid::new();
        self.directory.add_patient(id);
        id
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

/// Occupying appointments never overlap, the index agrees with the records, and no listed
/// slot touches an occupied interval.
async fn assert_calendar_consistent(engine: &Engine, doctor: Ulid) {
    let day = Span::new(OPEN, CLOSE);
    let occupying: Vec<Appointment> = engine
        .doctor_appointments(doctor, AppointmentFilter::default())
        .await
        .into_iter()
        .filter(Appointment::occupies_calendar)
        .collect();

    for (i, a) in occupying.iter().enumerate() {
        for b in &occupying[i + 1..] {
            assert!(
                !a.span.overlaps(&b.span),
                "{} [{}, {}) overlaps {} [{}, {})",
                a.id,
                a.span.start,
                a.span.end,
                b.id,
                b.span.start,
                b.span.end
            );
        }
    }

    let mut indexed = engine.query_overlap(doctor, day).await.unwrap();
    let mut expected: Vec<Ulid> = occupying.iter().map(|a| a.id).collect();
    indexed.sort();
    expected.sort();
    assert_eq!(indexed, expected);

    let slots = engine.list_available_slots(doctor, day, SLOT).await.unwrap();
    for slot in &slots {
        assert!(day.contains_span(slot));
        assert!(occupying.iter().all(|a| !a.span.overlaps(slot)));
    }
}

// ── Exactly one winner ───────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_of_many_identical_bookings_wins() {
    let clinic = clinic(1);
    let doctor = clinic.doctors[0];
    let span = Span::new(OPEN + HOUR, OPEN + HOUR + 30 * MINUTE);

    let handles: Vec<_> = (0..64)
        .map(|_| {
            let engine = clinic.engine.clone();
            let patient = clinic.patient();
            tokio::spawn(async move { engine.book(doctor, patient, span).await })
        })
        .collect();
    let results = futures::future::join_all(handles).await;

    let mut winners = Vec::new();
    for result in results {
        match result.unwrap() {
            Ok(appt) => winners.push(appt.id),
            Err(EngineError::SlotConflict(ids)) => assert_eq!(ids.len(), 1),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(clinic.engine.query_overlap(doctor, span).await.unwrap(), winners);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_doctors_book_in_parallel() {
    let clinic = clinic(8);
    let span = Span::new(OPEN, OPEN + HOUR);
    let handles: Vec<_> = clinic
        .doctors
        .iter()
        .map(|&doctor| {
            let engine = clinic.engine.clone();
            let patient = clinic.patient();
            tokio::spawn(async move { engine.book(doctor, patient, span).await })
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Every request contains the instant OPEN + 29min, so they pairwise overlap.
    #[test]
    fn overlapping_concurrent_bookings_have_one_winner(
        requests in prop::collection::vec((0..30i64, 30..90i64), 2..24)
    ) {
        let rt = runtime();
        let (winners, conflicts) = rt.block_on(async {
            let clinic = clinic(1);
            let doctor = clinic.doctors[0];
            let handles: Vec<_> = requests
                .iter()
                .map(|&(offset, len)| {
                    let engine = clinic.engine.clone();
                    let patient = clinic.patient();
                    let start = OPEN + offset * MINUTE;
                    let span = Span::new(start, start + len * MINUTE);
                    tokio::spawn(async move { engine.book(doctor, patient, span).await })
                })
                .collect();

            let mut winners = 0;
            let mut conflicts = 0;
            for result in futures::future::join_all(handles).await {
                match result.unwrap() {
                    Ok(_) => winners += 1,
                    Err(EngineError::SlotConflict(_)) => conflicts += 1,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            assert_calendar_consistent(&clinic.engine, doctor).await;
            (winners, conflicts)
        });
        prop_assert_eq!(winners, 1);
        prop_assert_eq!(conflicts, requests.len() - 1);
    }
}

// ── Random concurrent workloads ──────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Book { doctor: usize, slot: i64, len: i64 },
    Reschedule { pick: usize, slot: i64, len: i64 },
    Cancel { pick: usize },
    Advance { pick: usize },
}

/// Quarter-hour positions inside 08:00-18:00; `slot + len` never passes closing time.
fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..DOCTORS, 0..37i64, 1..4i64).prop_map(|(doctor, slot, len)| Op::Book { doctor, slot, len }),
        1 => (any::<usize>(), 0..37i64, 1..4i64).prop_map(|(pick, slot, len)| Op::Reschedule { pick, slot, len }),
        1 => any::<usize>().prop_map(|pick| Op::Cancel { pick }),
        1 => any::<usize>().prop_map(|pick| Op::Advance { pick }),
    ]
}

fn slot_span(slot: i64, len: i64) -> Span {
    Span::new(OPEN + slot * SLOT, OPEN + (slot + len) * SLOT)
}

async fn run_op(engine: Arc<Engine>, doctors: Vec<Ulid>, patient: Ulid, booked: Vec<Ulid>, op: Op) -> Result<Appointment, EngineError> {
    let pick = |i: usize| booked.get(i % booked.len().max(1)).copied().unwrap_or_else(Ulid::new);
    match op {
        Op::Book { doctor, slot, len } => engine.book(doctors[doctor], patient, slot_span(slot, len)).await,
        Op::Reschedule { pick: i, slot, len } => engine.reschedule(pick(i), slot_span(slot, len)).await,
        Op::Cancel { pick: i } => engine.cancel(pick(i), None).await,
        Op::Advance { pick: i } => {
            let id = pick(i);
            let status = engine.get_appointment(&id).await.map(|a| a.status);
            match status {
                Some(AppointmentStatus::Requested) => engine.confirm(id).await,
                Some(AppointmentStatus::Confirmed) => engine.start(id).await,
                Some(AppointmentStatus::InProgress) => engine.complete(id).await,
                _ => engine.mark_no_show(id).await,
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn random_workloads_never_double_book(
        rounds in prop::collection::vec(prop::collection::vec(op(), 1..10), 1..8)
    ) {
        let rt = runtime();
        rt.block_on(async {
            let clinic = clinic(DOCTORS);
            let mut booked: Vec<Ulid> = Vec::new();
            for round in rounds {
                let handles: Vec<_> = round
                    .into_iter()
                    .map(|op| {
                        tokio::spawn(run_op(
                            clinic.engine.clone(),
                            clinic.doctors.clone(),
                            clinic.patient(),
                            booked.clone(),
                            op,
                        ))
                    })
                    .collect();
                for result in futures::future::join_all(handles).await {
                    match result.unwrap() {
                        Ok(appt) => {
                            if !booked.contains(&appt.id) {
                                booked.push(appt.id);
                            }
                        }
                        Err(
                            EngineError::SlotConflict(_)
                            | EngineError::InvalidTransition { .. }
                            | EngineError::NotFound(..),
                        ) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                for &doctor in &clinic.doctors {
                    assert_calendar_consistent(&clinic.engine, doctor).await;
                }
            }
        });
    }
}
