use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{SessionState, TimerState};

/// Every state change in a guided session produces an Event.
/// The CLI prints them; a frontend would subscribe to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        routine_id: String,
        step_count: usize,
        at: DateTime<Utc>,
    },
    TimerStarted {
        step_index: usize,
        duration_secs: u32,
        at: DateTime<Utc>,
    },
    TimerPaused {
        step_index: usize,
        remaining_secs: u32,
        at: DateTime<Utc>,
    },
    TimerResumed {
        step_index: usize,
        remaining_secs: u32,
        at: DateTime<Utc>,
    },
    /// One whole second of the current step elapsed.
    Tick {
        step_index: usize,
        remaining_secs: u32,
    },
    /// The current step's countdown reached zero; auto-advance is armed.
    TimerCompleted {
        step_index: usize,
        at: DateTime<Utc>,
    },
    /// A step was marked done for this session (first completion only).
    StepCompleted {
        step_index: usize,
        step_id: String,
        at: DateTime<Utc>,
    },
    StepAdvanced {
        step_index: usize,
        duration_secs: u32,
        at: DateTime<Utc>,
    },
    SteppedBack {
        from_step: usize,
        to_step: usize,
        at: DateTime<Utc>,
    },
    /// Every step is done; the session is finished.
    RoutineCompleted {
        routine_id: String,
        step_count: usize,
        total_duration_secs: u32,
        at: DateTime<Utc>,
    },
    SessionExited {
        step_index: usize,
        at: DateTime<Utc>,
    },
    /// Recording a step completion failed. Informational: the session
    /// keeps moving.
    StepRecordFailed {
        step_id: String,
        error: String,
        at: DateTime<Utc>,
    },
    /// Recording the routine completion failed. Informational: the
    /// session still finishes.
    RoutineRecordFailed {
        routine_id: String,
        error: String,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        session_state: SessionState,
        timer_state: TimerState,
        step_index: usize,
        step_count: usize,
        product_name: Option<String>,
        remaining_secs: u32,
        progress_pct: f64,
        at: DateTime<Utc>,
    },
}
