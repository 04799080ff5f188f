//! SQLite-based routine catalog and session history.
//!
//! Provides persistent storage for:
//! - Routines and their ordered steps
//! - Finished guided sessions and statistics
//! - Key-value store for application state (notably the serialized
//!   session engine between CLI invocations)
//!
//! Also the real [`CompletionRecorder`]: the session engine hands step
//! and routine completions here.

use std::path::Path;

use chrono::{DateTime, Local, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::{CoreError, DatabaseError};
use crate::recorder::CompletionRecorder;
use crate::routine::{Routine, RoutineStep, TimeOfDay};
use crate::session::SessionSummary;

/// One finished guided session, as stored in history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub routine_id: String,
    pub routine_name: String,
    pub step_count: usize,
    pub total_duration_secs: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Stats {
    pub sessions: u64,
    pub steps_completed: u64,
    pub total_duration_secs: u64,
}

/// Parse time of day from database string
fn parse_time_of_day(s: &str) -> TimeOfDay {
    match s {
        "evening" => TimeOfDay::Evening,
        _ => TimeOfDay::Morning,
    }
}

/// Format time of day for database storage
fn format_time_of_day(tod: TimeOfDay) -> &'static str {
    match tod {
        TimeOfDay::Morning => "morning",
        TimeOfDay::Evening => "evening",
    }
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Build a RoutineStep from a step row
/// (id, routine_id, product_name, category, instructions, duration_secs,
/// order_index, is_completed).
fn row_to_step(row: &rusqlite::Row) -> Result<RoutineStep, rusqlite::Error> {
    Ok(RoutineStep {
        id: row.get(0)?,
        routine_id: row.get(1)?,
        product_name: row.get(2)?,
        category: row.get(3)?,
        instructions: row.get(4)?,
        duration_secs: row.get(5)?,
        order_index: row.get(6)?,
        is_completed: row.get::<_, i32>(7)? != 0,
    })
}

/// SQLite database for the routine catalog, session history, and kv
/// state.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data_dir>/careloop.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        Self::open_at(&data_dir()?.join("careloop.db"))
    }

    /// Open a database at an explicit path, creating the schema if
    /// needed.
    pub fn open_at(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS routines (
                    id              TEXT PRIMARY KEY,
                    name            TEXT NOT NULL,
                    time_of_day     TEXT NOT NULL,
                    is_active       INTEGER NOT NULL DEFAULT 1,
                    completed_today INTEGER NOT NULL DEFAULT 0,
                    completed_on    TEXT,
                    created_at      TEXT NOT NULL,
                    updated_at      TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS steps (
                    id            TEXT PRIMARY KEY,
                    routine_id    TEXT NOT NULL REFERENCES routines(id),
                    product_name  TEXT NOT NULL,
                    category      TEXT NOT NULL DEFAULT '',
                    instructions  TEXT NOT NULL DEFAULT '',
                    duration_secs INTEGER NOT NULL,
                    order_index   INTEGER NOT NULL,
                    is_completed  INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                    routine_id          TEXT NOT NULL,
                    routine_name        TEXT NOT NULL DEFAULT '',
                    step_count          INTEGER NOT NULL,
                    total_duration_secs INTEGER NOT NULL,
                    started_at          TEXT NOT NULL,
                    finished_at         TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                -- Step retrieval order is never container order.
                CREATE INDEX IF NOT EXISTS idx_steps_routine_order
                    ON steps(routine_id, order_index);
                CREATE INDEX IF NOT EXISTS idx_sessions_finished_at
                    ON sessions(finished_at);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    // ── Routine catalog ──────────────────────────────────────────────

    /// Create a routine with its steps in a single transaction. Steps
    /// are written with dense order indices regardless of their input
    /// order.
    pub fn create_routine(&self, routine: &Routine) -> Result<(), DatabaseError> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result: Result<(), rusqlite::Error> = (|| {
            self.conn.execute(
                "INSERT INTO routines (id, name, time_of_day, is_active, completed_today,
                                       completed_on, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7)",
                params![
                    routine.id,
                    routine.name,
                    format_time_of_day(routine.time_of_day),
                    routine.is_active as i32,
                    routine.completed_today as i32,
                    routine.created_at.to_rfc3339(),
                    routine.updated_at.to_rfc3339(),
                ],
            )?;
            for (index, step) in routine.sorted_steps().iter().enumerate() {
                self.conn.execute(
                    "INSERT INTO steps (id, routine_id, product_name, category, instructions,
                                        duration_secs, order_index, is_completed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        step.id,
                        routine.id,
                        step.product_name,
                        step.category,
                        step.instructions,
                        step.duration_secs,
                        index as i64,
                        step.is_completed as i32,
                    ],
                )?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(())
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err.into())
            }
        }
    }

    /// Get a routine by ID, steps in order.
    pub fn get_routine(&self, id: &str) -> Result<Option<Routine>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, time_of_day, is_active, completed_today, created_at, updated_at
             FROM routines WHERE id = ?1",
        )?;
        let routine = stmt
            .query_row(params![id], |row| {
                let tod: String = row.get(2)?;
                Ok(Routine {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    time_of_day: parse_time_of_day(&tod),
                    is_active: row.get::<_, i32>(3)? != 0,
                    completed_today: row.get::<_, i32>(4)? != 0,
                    steps: Vec::new(),
                    created_at: parse_datetime_fallback(&row.get::<_, String>(5)?),
                    updated_at: parse_datetime_fallback(&row.get::<_, String>(6)?),
                })
            })
            .optional()?;

        match routine {
            Some(mut routine) => {
                routine.steps = self.load_steps(&routine.id)?;
                Ok(Some(routine))
            }
            None => Ok(None),
        }
    }

    /// List routines, optionally filtered by time of day, steps loaded
    /// and in order.
    pub fn list_routines(
        &self,
        time_of_day: Option<TimeOfDay>,
    ) -> Result<Vec<Routine>, DatabaseError> {
        let mut query = "SELECT id, name, time_of_day, is_active, completed_today, created_at, updated_at
             FROM routines"
            .to_string();
        if time_of_day.is_some() {
            query += " WHERE time_of_day = ?1";
        }
        query += " ORDER BY created_at ASC";

        let mut stmt = self.conn.prepare(&query)?;
        let map_row = |row: &rusqlite::Row| -> Result<Routine, rusqlite::Error> {
            let tod: String = row.get(2)?;
            Ok(Routine {
                id: row.get(0)?,
                name: row.get(1)?,
                time_of_day: parse_time_of_day(&tod),
                is_active: row.get::<_, i32>(3)? != 0,
                completed_today: row.get::<_, i32>(4)? != 0,
                steps: Vec::new(),
                created_at: parse_datetime_fallback(&row.get::<_, String>(5)?),
                updated_at: parse_datetime_fallback(&row.get::<_, String>(6)?),
            })
        };

        let routines = if let Some(tod) = time_of_day {
            stmt.query_map(params![format_time_of_day(tod)], map_row)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?
        };

        let mut items = routines;
        for routine in &mut items {
            routine.steps = self.load_steps(&routine.id)?;
        }
        Ok(items)
    }

    pub fn rename_routine(
        &self,
        id: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE routines SET name = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, name, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Delete a routine and its steps.
    pub fn delete_routine(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM steps WHERE routine_id = ?1", params![id])?;
        self.conn
            .execute("DELETE FROM routines WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ── Step catalog ─────────────────────────────────────────────────

    /// Append a step at the end of a routine. Returns the stored step.
    pub fn add_step(
        &self,
        routine_id: &str,
        product_name: &str,
        category: &str,
        instructions: &str,
        duration_secs: u32,
        now: DateTime<Utc>,
    ) -> Result<RoutineStep, DatabaseError> {
        let next_index: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(order_index) + 1, 0) FROM steps WHERE routine_id = ?1",
            params![routine_id],
            |row| row.get(0),
        )?;
        let step = RoutineStep::new(
            routine_id,
            product_name,
            category,
            instructions,
            duration_secs,
            next_index as u32,
        );
        self.conn.execute(
            "INSERT INTO steps (id, routine_id, product_name, category, instructions,
                                duration_secs, order_index, is_completed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                step.id,
                step.routine_id,
                step.product_name,
                step.category,
                step.instructions,
                step.duration_secs,
                next_index,
            ],
        )?;
        self.touch_routine(routine_id, now)?;
        Ok(step)
    }

    /// Remove a step and close the gap it leaves, keeping order indices
    /// dense.
    pub fn remove_step(
        &self,
        routine_id: &str,
        step_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result: Result<(), rusqlite::Error> = (|| {
            self.conn.execute(
                "DELETE FROM steps WHERE id = ?1 AND routine_id = ?2",
                params![step_id, routine_id],
            )?;
            self.resequence_steps(routine_id)?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.conn.execute_batch("COMMIT;")?;
                self.touch_routine(routine_id, now)?;
                Ok(())
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err.into())
            }
        }
    }

    /// Replace a routine's steps wholesale: the stored set is deleted
    /// and `steps` reinserted with dense indices and cleared completion
    /// flags. This is the edit-screen save path.
    pub fn replace_steps(
        &self,
        routine_id: &str,
        steps: &[RoutineStep],
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        let result: Result<(), rusqlite::Error> = (|| {
            self.conn
                .execute("DELETE FROM steps WHERE routine_id = ?1", params![routine_id])?;
            for (index, step) in steps.iter().enumerate() {
                self.conn.execute(
                    "INSERT INTO steps (id, routine_id, product_name, category, instructions,
                                        duration_secs, order_index, is_completed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
                    params![
                        step.id,
                        routine_id,
                        step.product_name,
                        step.category,
                        step.instructions,
                        step.duration_secs,
                        index as i64,
                    ],
                )?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.conn.execute_batch("COMMIT;")?;
                self.touch_routine(routine_id, now)?;
                Ok(())
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err.into())
            }
        }
    }

    /// Clear the per-session completion flags. Called when a session
    /// for the routine starts.
    pub fn reset_step_completions(&self, routine_id: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE steps SET is_completed = 0 WHERE routine_id = ?1",
            params![routine_id],
        )?;
        Ok(())
    }

    /// Clear `completed_today` on routines whose completion date is not
    /// `today`. The day-boundary policy lives here, not in the session
    /// engine; per-session step flags are untouched (they reset at the
    /// next session start). Returns how many routines were refreshed.
    pub fn refresh_daily(&self, today: NaiveDate) -> Result<usize, DatabaseError> {
        let count = self.conn.execute(
            "UPDATE routines
             SET completed_today = 0
             WHERE completed_today = 1
               AND (completed_on IS NULL OR completed_on != ?1)",
            params![today.format("%Y-%m-%d").to_string()],
        )?;
        Ok(count)
    }

    // ── Session history ──────────────────────────────────────────────

    /// Record a finished session to history.
    pub fn record_session(&self, summary: &SessionSummary) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO sessions (routine_id, routine_name, step_count, total_duration_secs,
                                   started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                summary.routine_id,
                summary.routine_name,
                summary.step_count as i64,
                summary.total_duration_secs,
                summary.started_at.to_rfc3339(),
                summary.finished_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent sessions first.
    pub fn list_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, routine_id, routine_name, step_count, total_duration_secs,
                    started_at, finished_at
             FROM sessions
             ORDER BY finished_at DESC
             LIMIT ?1",
        )?;
        let records = stmt.query_map(params![limit as i64], |row| {
            Ok(SessionRecord {
                id: row.get(0)?,
                routine_id: row.get(1)?,
                routine_name: row.get(2)?,
                step_count: row.get::<_, i64>(3)? as usize,
                total_duration_secs: row.get(4)?,
                started_at: parse_datetime_fallback(&row.get::<_, String>(5)?),
                finished_at: parse_datetime_fallback(&row.get::<_, String>(6)?),
            })
        })?;
        Ok(records.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn stats_today(&self) -> Result<Stats, DatabaseError> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let stats = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(step_count), 0), COALESCE(SUM(total_duration_secs), 0)
             FROM sessions
             WHERE finished_at >= ?1",
            params![format!("{today}T00:00:00+00:00")],
            |row| {
                Ok(Stats {
                    sessions: row.get(0)?,
                    steps_completed: row.get(1)?,
                    total_duration_secs: row.get(2)?,
                })
            },
        )?;
        Ok(stats)
    }

    pub fn stats_all(&self) -> Result<Stats, DatabaseError> {
        let stats = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(step_count), 0), COALESCE(SUM(total_duration_secs), 0)
             FROM sessions",
            [],
            |row| {
                Ok(Stats {
                    sessions: row.get(0)?,
                    steps_completed: row.get(1)?,
                    total_duration_secs: row.get(2)?,
                })
            },
        )?;
        Ok(stats)
    }

    // ── Key-value store ──────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        Ok(stmt
            .query_row(params![key], |row| row.get::<_, String>(0))
            .optional()?)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove a key from the kv store.
    pub fn kv_delete(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn load_steps(&self, routine_id: &str) -> Result<Vec<RoutineStep>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, routine_id, product_name, category, instructions, duration_secs,
                    order_index, is_completed
             FROM steps
             WHERE routine_id = ?1
             ORDER BY order_index ASC",
        )?;
        let steps = stmt.query_map(params![routine_id], row_to_step)?;
        Ok(steps.collect::<Result<Vec<_>, _>>()?)
    }

    fn resequence_steps(&self, routine_id: &str) -> Result<(), rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM steps WHERE routine_id = ?1 ORDER BY order_index ASC",
        )?;
        let ids = stmt
            .query_map(params![routine_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for (index, id) in ids.iter().enumerate() {
            self.conn.execute(
                "UPDATE steps SET order_index = ?2 WHERE id = ?1",
                params![id, index as i64],
            )?;
        }
        Ok(())
    }

    fn touch_routine(&self, routine_id: &str, now: DateTime<Utc>) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE routines SET updated_at = ?2 WHERE id = ?1",
            params![routine_id, now.to_rfc3339()],
        )?;
        Ok(())
    }
}

impl CompletionRecorder for Database {
    fn record_step_completion(&self, step_id: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.conn.execute(
            "UPDATE steps SET is_completed = 1 WHERE id = ?1",
            params![step_id],
        )?;
        Ok(())
    }

    fn record_routine_completion(
        &self,
        routine_id: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        self.conn.execute(
            "UPDATE routines
             SET completed_today = 1, completed_on = ?2, updated_at = ?3
             WHERE id = ?1",
            params![routine_id, today, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
