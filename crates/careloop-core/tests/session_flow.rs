//! Integration tests for complete guided sessions.
//!
//! These tests drive the session engine the way a host does: against the
//! real SQLite recorder, with the engine persisted and reloaded between
//! operations, over fabricated wall-clock instants.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::cell::RefCell;

use careloop_core::{
    CompletionRecorder, Database, Event, Routine, RoutineStep, SessionEngine, SessionState,
    TimeOfDay,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 7, 30, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(secs)
}

fn routine_with(durations: &[u32]) -> Routine {
    let mut routine = Routine::new("Custom", TimeOfDay::Evening, t0());
    routine.steps = durations
        .iter()
        .enumerate()
        .map(|(i, secs)| {
            RoutineStep::new(
                &routine.id,
                &format!("Step {}", i + 1),
                "Product",
                "",
                *secs,
                i as u32,
            )
        })
        .collect();
    routine
}

/// Recorder that logs every call in order.
#[derive(Default)]
struct RecorderLog {
    steps: RefCell<Vec<String>>,
    routines: RefCell<Vec<String>>,
}

impl CompletionRecorder for RecorderLog {
    fn record_step_completion(&self, step_id: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.steps.borrow_mut().push(step_id.to_string());
        Ok(())
    }

    fn record_routine_completion(
        &self,
        routine_id: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.routines.borrow_mut().push(routine_id.to_string());
        Ok(())
    }
}

#[test]
fn test_timed_session_marks_the_catalog() {
    let db = Database::open_memory().unwrap();
    let routine = Routine::starter(TimeOfDay::Morning, t0());
    db.create_routine(&routine).unwrap();
    let routine = db.get_routine(&routine.id).unwrap().unwrap();

    // 30s + 15s + 15s with a one-second grace after each countdown.
    let (mut session, _) = SessionEngine::start(routine, t0(), 1, true).unwrap();
    session.toggle_running(t0());
    let mut events = Vec::new();
    for secs in 1..=63 {
        events.extend(session.tick(at(secs), &db));
        if session.state() == SessionState::Finished {
            break;
        }
    }

    assert_eq!(session.state(), SessionState::Finished);
    // 30 + 1 grace, 15 + 1, 15 + 1.
    assert_eq!(session.summary().unwrap().finished_at, at(63));

    let stored = db.get_routine(session.routine().id.as_str()).unwrap().unwrap();
    assert!(stored.completed_today);
    assert!(stored.steps.iter().all(|s| s.is_completed));

    db.record_session(&session.summary().unwrap()).unwrap();
    let stats = db.stats_all().unwrap();
    assert_eq!(stats.sessions, 1);
    assert_eq!(stats.steps_completed, 3);
    assert_eq!(stats.total_duration_secs, 60);

    // One Tick per counted-down second across the whole routine.
    let tick_count = events
        .iter()
        .filter(|e| matches!(e, Event::Tick { .. }))
        .count();
    assert_eq!(tick_count, 60);
}

#[test]
fn test_pause_stretches_wall_time_not_step_time() {
    let db = Database::open_memory().unwrap();
    let routine = routine_with(&[10, 10]);
    db.create_routine(&routine).unwrap();

    let (mut session, _) = SessionEngine::start(routine, t0(), 1, true).unwrap();
    session.toggle_running(t0());
    session.tick(at(4), &db);
    session.toggle_running(at(4)); // pause with 6s left

    // Five minutes pass unobserved.
    assert!(session.tick(at(304), &db).is_empty());
    assert_eq!(session.remaining_secs(), 6);

    session.toggle_running(at(304));
    session.tick(at(310), &db); // countdown done
    let events = session.tick(at(311), &db); // grace elapsed, auto-advance
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::StepAdvanced { step_index: 1, .. })));
    assert_eq!(session.step_index(), 1);
}

#[test]
fn test_skip_and_back_record_each_step_once() {
    let db = Database::open_memory().unwrap();
    let routine = Routine::starter(TimeOfDay::Evening, t0());
    db.create_routine(&routine).unwrap();
    let routine = db.get_routine(&routine.id).unwrap().unwrap();
    let first_id = routine.steps[0].id.clone();

    let (mut session, _) = SessionEngine::start(routine, t0(), 1, true).unwrap();
    session.advance(t0(), &db); // skip ahead without running the timer
    session.retreat(at(1)); // revisit the first step
    session.advance(at(2), &db); // leave it again

    let stored = db.get_routine(session.routine().id.as_str()).unwrap().unwrap();
    assert!(stored.steps[0].is_completed);
    assert!(!stored.steps[1].is_completed);
    // Revisiting did not double-record; the stored flag flipped exactly
    // once and the session still sits on step 1 of 3.
    assert_eq!(session.step_index(), 1);
    assert_eq!(stored.steps[0].id, first_id);
}

#[test]
fn test_exit_keeps_already_recorded_steps() {
    let db = Database::open_memory().unwrap();
    let routine = Routine::starter(TimeOfDay::Morning, t0());
    db.create_routine(&routine).unwrap();
    let routine = db.get_routine(&routine.id).unwrap().unwrap();

    let (mut session, _) = SessionEngine::start(routine, t0(), 1, true).unwrap();
    session.advance(t0(), &db);
    let events = session.exit(at(5));
    assert!(matches!(events[0], Event::SessionExited { step_index: 1, .. }));

    let stored = db.get_routine(session.routine().id.as_str()).unwrap().unwrap();
    assert!(stored.steps[0].is_completed);
    assert!(!stored.completed_today);
    assert!(session.summary().is_none());

    // Dead sessions ignore everything, including the recorder.
    assert!(session.tick(at(600), &db).is_empty());
    assert!(session.advance(at(600), &db).is_empty());
}

#[test]
fn test_engine_survives_kv_persistence_between_invocations() {
    let db = Database::open_memory().unwrap();
    let routine = Routine::starter(TimeOfDay::Morning, t0());
    db.create_routine(&routine).unwrap();
    let routine = db.get_routine(&routine.id).unwrap().unwrap();

    // Invocation one: start, run 12 seconds, persist.
    let (mut session, _) = SessionEngine::start(routine, t0(), 1, true).unwrap();
    session.toggle_running(t0());
    session.tick(at(12), &db);
    db.kv_set("session_engine", &serde_json::to_string(&session).unwrap())
        .unwrap();
    drop(session);

    // Invocation two, twenty minutes later: the away time is discarded.
    let json = db.kv_get("session_engine").unwrap().unwrap();
    let mut session: SessionEngine = serde_json::from_str(&json).unwrap();
    session.resync(at(1200));
    assert!(session.tick(at(1200), &db).is_empty());
    assert_eq!(session.remaining_secs(), 18);
    assert_eq!(session.state(), SessionState::Running);

    // The countdown picks up where it left off.
    let events = session.tick(at(1218), &db);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::TimerCompleted { step_index: 0, .. })));
}

#[test]
fn test_records_land_before_the_next_step_starts() {
    let log = RecorderLog::default();
    let (mut session, _) = SessionEngine::start(routine_with(&[2, 2, 2]), t0(), 1, true).unwrap();
    session.toggle_running(t0());

    let mut events = Vec::new();
    for secs in 1..=9 {
        events.extend(session.tick(at(secs), &log));
    }
    assert_eq!(session.state(), SessionState::Finished);

    // For every step k, its completion event precedes the start of
    // step k+1's countdown.
    for k in 0..2 {
        let completed = events
            .iter()
            .position(|e| matches!(e, Event::StepCompleted { step_index, .. } if *step_index == k));
        let started = events.iter().position(
            |e| matches!(e, Event::TimerStarted { step_index, .. } if *step_index == k + 1),
        );
        assert!(completed.unwrap() < started.unwrap(), "step {k}");
    }
    assert!(matches!(
        events.last(),
        Some(Event::RoutineCompleted { .. })
    ));
}

proptest! {
    /// Advancing manually through any non-empty routine finishes it,
    /// records every step exactly once in order, and sums the durations.
    #[test]
    fn advance_always_reaches_finished(durations in prop::collection::vec(1u32..=120, 1..=8)) {
        let log = RecorderLog::default();
        let routine = routine_with(&durations);
        let expected_ids: Vec<String> = routine.steps.iter().map(|s| s.id.clone()).collect();

        let (mut session, _) = SessionEngine::start(routine, t0(), 1, true).unwrap();
        for i in 0..durations.len() {
            prop_assert_eq!(session.step_index(), i);
            session.advance(at(i as i64), &log);
        }

        prop_assert_eq!(session.state(), SessionState::Finished);
        prop_assert_eq!(session.step_index(), durations.len());
        prop_assert_eq!(session.progress(), 1.0);
        prop_assert_eq!(&*log.steps.borrow(), &expected_ids);
        prop_assert_eq!(log.routines.borrow().len(), 1);

        let summary = session.summary().unwrap();
        prop_assert_eq!(summary.step_count, durations.len());
        prop_assert_eq!(summary.total_duration_secs, durations.iter().sum::<u32>());
    }

    /// Ticking once a second completes any routine in exactly the sum of
    /// its durations plus one grace interval per step.
    #[test]
    fn one_second_ticks_always_reach_finished(
        durations in prop::collection::vec(1u32..=6, 1..=4),
        grace in 0u64..=3,
    ) {
        let log = RecorderLog::default();
        let (mut session, _) =
            SessionEngine::start(routine_with(&durations), t0(), grace, true).unwrap();
        session.toggle_running(t0());

        let total: u32 = durations.iter().sum();
        let deadline = total as i64 + grace as i64 * durations.len() as i64;
        let mut finished_at_tick = None;
        for secs in 1..=deadline {
            session.tick(at(secs), &log);
            if session.state() == SessionState::Finished {
                finished_at_tick = Some(secs);
                break;
            }
        }

        prop_assert_eq!(finished_at_tick, Some(deadline));
        prop_assert_eq!(log.steps.borrow().len(), durations.len());
        prop_assert_eq!(log.routines.borrow().len(), 1);
    }
}
