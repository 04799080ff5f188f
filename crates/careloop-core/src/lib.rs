//! # Careloop Core Library
//!
//! This library provides the core business logic for the Careloop guided
//! skincare-routine timer. It implements a CLI-first philosophy where all
//! operations are available via a standalone CLI binary; any GUI would be
//! a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Session Engine**: A wall-clock-based state machine that requires
//!   the caller to periodically invoke `tick()` for progress updates
//! - **Storage**: SQLite-based routine catalog and session history,
//!   TOML-based configuration
//! - **Recorder**: Boundary trait through which finished steps and
//!   routines are persisted without ever blocking a session
//!
//! ## Key Components
//!
//! - [`SessionEngine`]: One guided run through a routine's steps
//! - [`StepTimer`]: Countdown state machine for a single step
//! - [`Database`]: Routine, history, and state persistence
//! - [`Config`]: Application configuration management
//! - [`CompletionRecorder`]: Trait for completion persistence

pub mod error;
pub mod events;
pub mod recorder;
pub mod routine;
pub mod session;
pub mod storage;

pub use error::{ConfigError, CoreError, DatabaseError, SessionError, TimerError};
pub use events::Event;
pub use recorder::{CompletionRecorder, NullRecorder};
pub use routine::{Routine, RoutineStep, TimeOfDay};
pub use session::{SessionEngine, SessionState, SessionSummary, StepTimer, TimerState};
pub use storage::{Config, Database, SessionRecord, Stats};
