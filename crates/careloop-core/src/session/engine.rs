//! Guided-session engine.
//!
//! Drives one run through a routine's steps, one [`StepTimer`] per step.
//! Like the timer it is wall-clock-based with no internal thread: the
//! caller ticks it, and every mutating operation takes `now`.
//!
//! ## State Transitions
//!
//! ```text
//! Ready ──toggle──▶ Running ──toggle──▶ Paused
//!                     ▲                    │
//!                     └───────toggle───────┘
//! (advance on last step) ──▶ Finished               (terminal)
//! any non-Finished ──exit──▶ Exited                 (terminal)
//! ```
//!
//! No state permits re-entry into `Ready`. After construction every
//! operation is total: disallowed transitions return no events instead
//! of erroring, because rapid or conflicting user input must never
//! crash a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timer::{StepTimer, TimerNotice, TimerState};
use crate::error::SessionError;
use crate::events::Event;
use crate::recorder::CompletionRecorder;
use crate::routine::{Routine, RoutineStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Constructed, first step loaded, user has not pressed start.
    Ready,
    Running,
    Paused,
    /// Every step completed. Terminal.
    Finished,
    /// Abandoned before finishing. Terminal.
    Exited,
}

/// Armed when a step's countdown completes; fires `advance` once the
/// grace interval elapses. The step index pins the guard to the step it
/// was armed for, so a manual advance (or retreat) in the grace window
/// makes it stale instead of double-skipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct PendingAdvance {
    step_index: usize,
    due_at: DateTime<Utc>,
}

fn default_auto_advance() -> bool {
    true
}

/// What a finished session amounted to. Available only in `Finished`;
/// a full run completes every countdown, so the total duration is the
/// sum of all step durations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub routine_id: String,
    pub routine_name: String,
    pub step_count: usize,
    pub total_duration_secs: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// One guided, timed run through a routine.
///
/// Holds a private snapshot of the routine taken at start: edits to the
/// stored routine elsewhere never affect an in-flight session. The
/// engine serializes, so a host can persist it between invocations; the
/// recorder is passed into the operations that may record rather than
/// owned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEngine {
    routine: Routine,
    state: SessionState,
    /// In `[0, step_count)` while the session is live; equals
    /// `step_count` exactly once, at `Finished`.
    step_index: usize,
    timer: StepTimer,
    grace_secs: u64,
    /// When false a completed countdown waits on the user instead of
    /// advancing by itself.
    #[serde(default = "default_auto_advance")]
    auto_advance: bool,
    #[serde(default)]
    pending_advance: Option<PendingAdvance>,
    started_at: DateTime<Utc>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
}

impl SessionEngine {
    /// Start a session over a snapshot of `routine`.
    ///
    /// Steps are put in dense order and their per-session completion
    /// flags cleared. The session begins `Ready` with the first step's
    /// timer loaded but not started. `grace_secs` is the delay between
    /// a countdown completing and the automatic advance (0 advances
    /// within the same tick); `auto_advance` turns that advance off
    /// entirely.
    pub fn start(
        routine: Routine,
        now: DateTime<Utc>,
        grace_secs: u64,
        auto_advance: bool,
    ) -> Result<(Self, Vec<Event>), SessionError> {
        if routine.steps.is_empty() {
            return Err(SessionError::EmptyRoutine);
        }
        let mut snapshot = routine;
        snapshot.steps = snapshot.sorted_steps();
        for (i, step) in snapshot.steps.iter_mut().enumerate() {
            if step.duration_secs == 0 {
                return Err(SessionError::InvalidStepDuration { step_index: i });
            }
            step.is_completed = false;
        }
        let first_duration = snapshot.steps.first().map(|s| s.duration_secs).unwrap_or(0);
        let timer = StepTimer::new(first_duration)
            .map_err(|_| SessionError::InvalidStepDuration { step_index: 0 })?;
        let events = vec![Event::SessionStarted {
            routine_id: snapshot.id.clone(),
            step_count: snapshot.step_count(),
            at: now,
        }];
        Ok((
            Self {
                routine: snapshot,
                state: SessionState::Ready,
                step_index: 0,
                timer,
                grace_secs,
                auto_advance,
                pending_advance: None,
                started_at: now,
                finished_at: None,
            },
            events,
        ))
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn current_step(&self) -> Option<&RoutineStep> {
        self.routine.steps.get(self.step_index)
    }

    pub fn routine(&self) -> &Routine {
        &self.routine
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn remaining_secs(&self) -> u32 {
        match self.state {
            SessionState::Finished => 0,
            _ => self.timer.remaining_secs(),
        }
    }

    /// 0.0 .. 1.0 across the routine, counted in whole steps; exactly
    /// 1.0 once `Finished`.
    pub fn progress(&self) -> f64 {
        self.step_index as f64 / self.routine.step_count() as f64
    }

    /// `Some` only once every step is done.
    pub fn summary(&self) -> Option<SessionSummary> {
        if self.state != SessionState::Finished {
            return None;
        }
        Some(SessionSummary {
            routine_id: self.routine.id.clone(),
            routine_name: self.routine.name.clone(),
            step_count: self.routine.step_count(),
            total_duration_secs: self.routine.total_duration_secs(),
            started_at: self.started_at,
            finished_at: self.finished_at?,
        })
    }

    /// Build a full state snapshot event for rendering.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Event {
        Event::StateSnapshot {
            session_state: self.state,
            timer_state: self.timer.state(),
            step_index: self.step_index,
            step_count: self.routine.step_count(),
            product_name: self.current_step().map(|s| s.product_name.clone()),
            remaining_secs: self.remaining_secs(),
            progress_pct: self.progress() * 100.0,
            at: now,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Flip between running and paused. Starts the current step's timer
    /// from `Ready`, resumes it from `Paused`, pauses it from `Running`.
    /// No-op once terminal.
    pub fn toggle_running(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        match self.state {
            SessionState::Ready | SessionState::Paused => {
                self.state = SessionState::Running;
                let notices = self.run_timer(now);
                self.absorb(notices, now, &mut events);
            }
            SessionState::Running => {
                self.state = SessionState::Paused;
                let notices = self.timer.pause(now);
                self.absorb(notices, now, &mut events);
            }
            SessionState::Finished | SessionState::Exited => {}
        }
        events
    }

    /// Complete the current step and move to the next one.
    ///
    /// Marks the step done (first completion per session only) and
    /// hands it to the recorder before the next step's timer starts, so
    /// persisted state read mid-session never runs ahead of the timers.
    /// On the last step this also records the routine completion and
    /// the session becomes `Finished`. No-op once terminal.
    pub fn advance(&mut self, now: DateTime<Utc>, recorder: &dyn CompletionRecorder) -> Vec<Event> {
        if matches!(self.state, SessionState::Finished | SessionState::Exited) {
            return Vec::new();
        }
        // Manual and automatic advance race within the grace window;
        // whichever runs first clears the guard.
        self.pending_advance = None;

        let mut events = Vec::new();
        let Some(step) = self.routine.steps.get_mut(self.step_index) else {
            return events;
        };
        if !step.is_completed {
            step.is_completed = true;
            let step_id = step.id.clone();
            events.push(Event::StepCompleted {
                step_index: self.step_index,
                step_id: step_id.clone(),
                at: now,
            });
            if let Err(e) = recorder.record_step_completion(&step_id) {
                events.push(Event::StepRecordFailed {
                    step_id,
                    error: e.to_string(),
                    at: now,
                });
            }
        }

        if self.step_index + 1 == self.routine.step_count() {
            self.routine.completed_today = true;
            if let Err(e) = recorder.record_routine_completion(&self.routine.id) {
                events.push(Event::RoutineRecordFailed {
                    routine_id: self.routine.id.clone(),
                    error: e.to_string(),
                    at: now,
                });
            }
            self.step_index = self.routine.step_count();
            self.state = SessionState::Finished;
            self.finished_at = Some(now);
            events.push(Event::RoutineCompleted {
                routine_id: self.routine.id.clone(),
                step_count: self.routine.step_count(),
                total_duration_secs: self.routine.total_duration_secs(),
                at: now,
            });
        } else {
            self.step_index += 1;
            let duration = self
                .current_step()
                .map(|s| s.duration_secs)
                .unwrap_or_default();
            self.timer.reset(duration);
            events.push(Event::StepAdvanced {
                step_index: self.step_index,
                duration_secs: duration,
                at: now,
            });
            if self.state == SessionState::Running {
                let notices = self.timer.start(now);
                self.absorb(notices, now, &mut events);
            }
        }
        events
    }

    /// Step back one step. Keeps the completion flag of the step being
    /// left, rearms the target step's timer to its full duration, and
    /// preserves the run state. No-op at the first step or once
    /// terminal.
    pub fn retreat(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        if matches!(self.state, SessionState::Finished | SessionState::Exited)
            || self.step_index == 0
        {
            return Vec::new();
        }
        self.pending_advance = None;

        let from = self.step_index;
        self.step_index -= 1;
        let duration = self
            .current_step()
            .map(|s| s.duration_secs)
            .unwrap_or_default();
        self.timer.reset(duration);

        let mut events = vec![Event::SteppedBack {
            from_step: from,
            to_step: self.step_index,
            at: now,
        }];
        if self.state == SessionState::Running {
            let notices = self.timer.start(now);
            self.absorb(notices, now, &mut events);
        }
        events
    }

    /// Drive time forward. Emits a tick event per elapsed second of the
    /// current step; a countdown completion arms the automatic advance,
    /// which fires here once its grace interval has elapsed (only while
    /// `Running`, and only if no manual action moved the step in the
    /// meantime).
    pub fn tick(&mut self, now: DateTime<Utc>, recorder: &dyn CompletionRecorder) -> Vec<Event> {
        if matches!(self.state, SessionState::Finished | SessionState::Exited) {
            return Vec::new();
        }
        let mut events = Vec::new();
        let notices = self.timer.tick(now);
        self.absorb(notices, now, &mut events);

        if let Some(pending) = self.pending_advance {
            if pending.step_index != self.step_index {
                self.pending_advance = None;
            } else if self.auto_advance
                && self.state == SessionState::Running
                && now >= pending.due_at
            {
                self.pending_advance = None;
                events.extend(self.advance(now, recorder));
            }
        }
        events
    }

    /// Abandon the session. Stops the timer synchronously (no tick will
    /// be observed after this returns), records nothing, and keeps
    /// whatever earlier advances already persisted. No-op once terminal.
    pub fn exit(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        if matches!(self.state, SessionState::Finished | SessionState::Exited) {
            return Vec::new();
        }
        // Freeze the countdown; the completion it may surface is
        // deliberately dropped, an abandoned step is not a done step.
        let _ = self.timer.pause(now);
        self.pending_advance = None;
        self.state = SessionState::Exited;
        vec![Event::SessionExited {
            step_index: self.step_index,
            at: now,
        }]
    }

    /// Re-anchor the timer after the host process was away. Wall time
    /// nobody watched must not complete steps invisibly.
    pub fn resync(&mut self, now: DateTime<Utc>) {
        self.timer.resync(now);
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Start or resume the current step's timer, whichever applies.
    fn run_timer(&mut self, now: DateTime<Utc>) -> Vec<TimerNotice> {
        match self.timer.state() {
            TimerState::Idle => self.timer.start(now),
            TimerState::Paused => self.timer.resume(now),
            _ => Vec::new(),
        }
    }

    /// Lift timer notices into session events; a countdown completion
    /// arms the automatic advance.
    fn absorb(&mut self, notices: Vec<TimerNotice>, now: DateTime<Utc>, out: &mut Vec<Event>) {
        for notice in notices {
            match notice {
                TimerNotice::Started { duration_secs } => out.push(Event::TimerStarted {
                    step_index: self.step_index,
                    duration_secs,
                    at: now,
                }),
                TimerNotice::Paused { remaining_secs } => out.push(Event::TimerPaused {
                    step_index: self.step_index,
                    remaining_secs,
                    at: now,
                }),
                TimerNotice::Resumed { remaining_secs } => out.push(Event::TimerResumed {
                    step_index: self.step_index,
                    remaining_secs,
                    at: now,
                }),
                TimerNotice::Tick { remaining_secs } => out.push(Event::Tick {
                    step_index: self.step_index,
                    remaining_secs,
                }),
                TimerNotice::Completed => {
                    out.push(Event::TimerCompleted {
                        step_index: self.step_index,
                        at: now,
                    });
                    // A grace beyond the calendar clamps to the far
                    // future; the advance then waits on the user.
                    let due_at = i64::try_from(self.grace_secs)
                        .ok()
                        .and_then(|secs| chrono::Duration::new(secs, 0))
                        .and_then(|grace| now.checked_add_signed(grace))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC);
                    self.pending_advance = Some(PendingAdvance {
                        step_index: self.step_index,
                        due_at,
                    });
                }
            }
        }
    }
}
