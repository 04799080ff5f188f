//! Single-step countdown timer.
//!
//! The timer is a wall-clock-based state machine with no internal thread:
//! every mutating operation takes `now`, and the caller is responsible for
//! calling `tick(now)` periodically. Tests drive virtual time by passing
//! fabricated instants.
//!
//! ## State Transitions
//!
//! ```text
//! Idle ──start──▶ Running ──pause──▶ Paused
//!                   ▲                   │
//!                   └──────resume───────┘
//! Running ──(remaining hits 0)──▶ Completed   (terminal until reset)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TimerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Completed,
}

/// What a timer operation observed. The session engine enriches these
/// with step context before emitting them as [`crate::events::Event`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerNotice {
    Started { duration_secs: u32 },
    Paused { remaining_secs: u32 },
    Resumed { remaining_secs: u32 },
    Tick { remaining_secs: u32 },
    Completed,
}

/// Countdown over whole seconds for one routine step.
///
/// Time is accounted in whole elapsed seconds: the anchor advances by
/// exactly the seconds consumed, so sub-second remainders carry over to
/// the next `tick` instead of being dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTimer {
    duration_secs: u32,
    remaining_secs: u32,
    state: TimerState,
    /// Instant up to which elapsed time has been accounted. `Some` only
    /// while running.
    #[serde(default)]
    last_tick: Option<DateTime<Utc>>,
}

impl StepTimer {
    /// Create a timer for a step of `duration_secs`, in `Idle`.
    pub fn new(duration_secs: u32) -> Result<Self, TimerError> {
        if duration_secs == 0 {
            return Err(TimerError::InvalidDuration);
        }
        Ok(Self {
            duration_secs,
            remaining_secs: duration_secs,
            state: TimerState::Idle,
            last_tick: None,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// `Idle → Running`. No-op in any other state.
    pub fn start(&mut self, now: DateTime<Utc>) -> Vec<TimerNotice> {
        match self.state {
            TimerState::Idle => {
                self.state = TimerState::Running;
                self.last_tick = Some(now);
                vec![TimerNotice::Started {
                    duration_secs: self.duration_secs,
                }]
            }
            _ => Vec::new(),
        }
    }

    /// `Running → Paused`, preserving remaining time. Elapsed whole
    /// seconds are accounted first, so a pause that lands after the
    /// countdown ran out surfaces the completion instead of pausing.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Vec<TimerNotice> {
        if self.state != TimerState::Running {
            return Vec::new();
        }
        let mut notices = self.account(now);
        if self.state == TimerState::Running {
            self.state = TimerState::Paused;
            self.last_tick = None;
            notices.push(TimerNotice::Paused {
                remaining_secs: self.remaining_secs,
            });
        }
        notices
    }

    /// `Paused → Running` from the preserved remaining time. No-op
    /// otherwise, or when nothing remains to count down.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Vec<TimerNotice> {
        if self.state != TimerState::Paused || self.remaining_secs == 0 {
            return Vec::new();
        }
        self.state = TimerState::Running;
        self.last_tick = Some(now);
        vec![TimerNotice::Resumed {
            remaining_secs: self.remaining_secs,
        }]
    }

    /// Rearm to `Idle` with a new full duration. Leaves any state,
    /// including `Completed`.
    pub fn reset(&mut self, duration_secs: u32) {
        self.duration_secs = duration_secs;
        self.remaining_secs = duration_secs;
        self.state = TimerState::Idle;
        self.last_tick = None;
    }

    /// Account elapsed time. Emits one `Tick` per whole elapsed second
    /// and exactly one `Completed` when remaining reaches zero, after
    /// which the timer is terminal until `reset`. No-op unless running.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<TimerNotice> {
        if self.state != TimerState::Running {
            return Vec::new();
        }
        self.account(now)
    }

    /// Re-anchor the accounting baseline without consuming the gap.
    ///
    /// For hosts that reload a running timer after the process was away
    /// (CLI invocations, app backgrounding): wall time nobody watched
    /// must not complete steps invisibly.
    pub fn resync(&mut self, now: DateTime<Utc>) {
        if self.state == TimerState::Running {
            self.last_tick = Some(now);
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn account(&mut self, now: DateTime<Utc>) -> Vec<TimerNotice> {
        let Some(anchor) = self.last_tick else {
            return Vec::new();
        };
        let elapsed = (now - anchor).num_seconds().max(0) as u64;
        let consumed = elapsed.min(self.remaining_secs as u64) as u32;
        let before = self.remaining_secs;
        let mut notices = Vec::with_capacity(consumed as usize + 1);
        for i in 1..=consumed {
            notices.push(TimerNotice::Tick {
                remaining_secs: before - i,
            });
        }
        self.remaining_secs = before - consumed;
        if self.remaining_secs == 0 {
            self.state = TimerState::Completed;
            self.last_tick = None;
            notices.push(TimerNotice::Completed);
        } else {
            self.last_tick = Some(anchor + chrono::Duration::seconds(consumed as i64));
        }
        notices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap()
    }

    fn ticks(notices: &[TimerNotice]) -> Vec<u32> {
        notices
            .iter()
            .filter_map(|n| match n {
                TimerNotice::Tick { remaining_secs } => Some(*remaining_secs),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn rejects_zero_duration() {
        assert_eq!(StepTimer::new(0), Err(TimerError::InvalidDuration));
    }

    #[test]
    fn start_pause_resume() {
        let mut timer = StepTimer::new(30).unwrap();
        assert_eq!(timer.state(), TimerState::Idle);

        assert!(!timer.start(t0()).is_empty());
        assert_eq!(timer.state(), TimerState::Running);

        // Start again is a no-op.
        assert!(timer.start(t0()).is_empty());

        assert!(!timer.pause(t0()).is_empty());
        assert_eq!(timer.state(), TimerState::Paused);
        assert!(timer.pause(t0()).is_empty());

        assert!(!timer.resume(t0()).is_empty());
        assert_eq!(timer.state(), TimerState::Running);
        assert!(timer.resume(t0()).is_empty());
    }

    #[test]
    fn tick_accounts_whole_seconds_and_keeps_the_remainder() {
        let mut timer = StepTimer::new(30).unwrap();
        timer.start(t0());

        let notices = timer.tick(t0() + chrono::Duration::milliseconds(2500));
        assert_eq!(ticks(&notices), vec![29, 28]);
        assert_eq!(timer.remaining_secs(), 28);

        // 0.5s remainder carries over: another 600ms crosses the boundary.
        let notices = timer.tick(t0() + chrono::Duration::milliseconds(3100));
        assert_eq!(ticks(&notices), vec![27]);
    }

    #[test]
    fn completes_exactly_once_then_stays_terminal() {
        let mut timer = StepTimer::new(3).unwrap();
        timer.start(t0());

        let notices = timer.tick(t0() + chrono::Duration::seconds(10));
        assert_eq!(ticks(&notices), vec![2, 1, 0]);
        assert_eq!(notices.last(), Some(&TimerNotice::Completed));
        assert_eq!(timer.state(), TimerState::Completed);

        // Terminal: no further notices of any kind.
        assert!(timer.tick(t0() + chrono::Duration::seconds(20)).is_empty());
        assert!(timer.start(t0() + chrono::Duration::seconds(20)).is_empty());
        assert!(timer.resume(t0() + chrono::Duration::seconds(20)).is_empty());
    }

    #[test]
    fn remaining_is_constant_while_paused() {
        let mut timer = StepTimer::new(30).unwrap();
        timer.start(t0());
        timer.tick(t0() + chrono::Duration::seconds(10));
        timer.pause(t0() + chrono::Duration::seconds(10));
        assert_eq!(timer.remaining_secs(), 20);

        assert!(timer.tick(t0() + chrono::Duration::seconds(500)).is_empty());
        assert_eq!(timer.remaining_secs(), 20);

        timer.resume(t0() + chrono::Duration::seconds(500));
        let notices = timer.tick(t0() + chrono::Duration::seconds(501));
        assert_eq!(ticks(&notices), vec![19]);
    }

    #[test]
    fn pause_folds_unaccounted_seconds_first() {
        let mut timer = StepTimer::new(30).unwrap();
        timer.start(t0());

        let notices = timer.pause(t0() + chrono::Duration::seconds(4));
        assert_eq!(ticks(&notices), vec![29, 28, 27, 26]);
        assert_eq!(
            notices.last(),
            Some(&TimerNotice::Paused { remaining_secs: 26 })
        );
    }

    #[test]
    fn pause_after_the_countdown_ran_out_surfaces_completion() {
        let mut timer = StepTimer::new(2).unwrap();
        timer.start(t0());

        let notices = timer.pause(t0() + chrono::Duration::seconds(30));
        assert_eq!(notices.last(), Some(&TimerNotice::Completed));
        assert_eq!(timer.state(), TimerState::Completed);
    }

    #[test]
    fn resync_discards_the_unwatched_gap() {
        let mut timer = StepTimer::new(30).unwrap();
        timer.start(t0());
        timer.tick(t0() + chrono::Duration::seconds(5));

        // Process was away for an hour; nothing elapses.
        let later = t0() + chrono::Duration::seconds(3600);
        timer.resync(later);
        assert!(timer.tick(later).is_empty());
        assert_eq!(timer.remaining_secs(), 25);

        let notices = timer.tick(later + chrono::Duration::seconds(2));
        assert_eq!(ticks(&notices), vec![24, 23]);
    }

    #[test]
    fn reset_rearms_from_any_state() {
        let mut timer = StepTimer::new(2).unwrap();
        timer.start(t0());
        timer.tick(t0() + chrono::Duration::seconds(5));
        assert_eq!(timer.state(), TimerState::Completed);

        timer.reset(15);
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(timer.remaining_secs(), 15);
        assert_eq!(timer.duration_secs(), 15);

        timer.start(t0() + chrono::Duration::seconds(6));
        let notices = timer.tick(t0() + chrono::Duration::seconds(7));
        assert_eq!(ticks(&notices), vec![14]);
    }

    #[test]
    fn clock_going_backwards_elapses_nothing() {
        let mut timer = StepTimer::new(30).unwrap();
        timer.start(t0());
        assert!(timer.tick(t0() - chrono::Duration::seconds(10)).is_empty());
        assert_eq!(timer.remaining_secs(), 30);
    }
}
