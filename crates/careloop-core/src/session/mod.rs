mod engine;
mod timer;

pub use engine::{SessionEngine, SessionState, SessionSummary};
pub use timer::{StepTimer, TimerNotice, TimerState};
