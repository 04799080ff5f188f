//! Guided session commands for CLI.
//!
//! The engine lives in the kv store between invocations. Every command
//! loads it, re-anchors its clock to now, applies one operation, and
//! stores the outcome: live sessions go back to kv, a finished session
//! becomes a history row, an exited one just disappears.

use careloop_core::storage::Database;
use careloop_core::{Config, Event, SessionEngine, SessionState};
use chrono::Utc;
use clap::Subcommand;

const ENGINE_KEY: &str = "session_engine";

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a guided session for a routine
    Start {
        /// Routine ID
        routine_id: String,
    },
    /// Print the current session state as JSON
    Status,
    /// Flip the session between running and paused
    Toggle,
    /// Complete the current step and move on
    Next,
    /// Step back to the previous step
    Back,
    /// Poll the session clock once
    Tick {
        /// Poll at now + N seconds (virtual time for scripting)
        #[arg(long, default_value = "0")]
        secs: i64,
    },
    /// Run the session live, polling once per second until it ends
    Watch,
    /// Abandon the session
    Exit,
    /// Print the most recent finished session
    Summary,
}

fn load_engine(db: &Database) -> Result<SessionEngine, Box<dyn std::error::Error>> {
    let json = db
        .kv_get(ENGINE_KEY)?
        .ok_or("no session in progress (run `careloop session start <routine-id>`)")?;
    let mut engine: SessionEngine = serde_json::from_str(&json)?;
    // Wall time between invocations must not age the countdown.
    engine.resync(Utc::now());
    Ok(engine)
}

fn save_engine(db: &Database, engine: &SessionEngine) -> Result<(), Box<dyn std::error::Error>> {
    db.kv_set(ENGINE_KEY, &serde_json::to_string(engine)?)?;
    Ok(())
}

fn store_outcome(db: &Database, engine: &SessionEngine) -> Result<(), Box<dyn std::error::Error>> {
    match engine.state() {
        SessionState::Finished => {
            if let Some(summary) = engine.summary() {
                db.record_session(&summary)?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            db.kv_delete(ENGINE_KEY)?;
        }
        SessionState::Exited => db.kv_delete(ENGINE_KEY)?,
        _ => save_engine(db, engine)?,
    }
    Ok(())
}

fn print_events(events: &[Event]) -> Result<(), Box<dyn std::error::Error>> {
    for event in events {
        println!("{}", serde_json::to_string_pretty(event)?);
    }
    Ok(())
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        SessionAction::Start { routine_id } => {
            if db.kv_get(ENGINE_KEY)?.is_some() {
                return Err(
                    "a session is already in progress (run `careloop session exit` first)".into(),
                );
            }
            let routine = db
                .get_routine(&routine_id)?
                .ok_or(format!("Routine not found: {routine_id}"))?;
            db.reset_step_completions(&routine_id)?;
            let config = Config::load_or_default();
            let now = Utc::now();
            let (engine, events) = SessionEngine::start(
                routine,
                now,
                config.session.grace_secs,
                config.session.auto_advance,
            )?;
            print_events(&events)?;
            println!("{}", serde_json::to_string_pretty(&engine.snapshot(now))?);
            save_engine(&db, &engine)?;
        }
        SessionAction::Status => {
            let engine = load_engine(&db)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&engine.snapshot(Utc::now()))?
            );
            save_engine(&db, &engine)?;
        }
        SessionAction::Toggle => {
            let mut engine = load_engine(&db)?;
            print_events(&engine.toggle_running(Utc::now()))?;
            store_outcome(&db, &engine)?;
        }
        SessionAction::Next => {
            let mut engine = load_engine(&db)?;
            print_events(&engine.advance(Utc::now(), &db))?;
            store_outcome(&db, &engine)?;
        }
        SessionAction::Back => {
            let mut engine = load_engine(&db)?;
            print_events(&engine.retreat(Utc::now()))?;
            store_outcome(&db, &engine)?;
        }
        SessionAction::Tick { secs } => {
            let mut engine = load_engine(&db)?;
            let at = chrono::Duration::new(secs, 0)
                .and_then(|offset| Utc::now().checked_add_signed(offset))
                .ok_or("tick offset out of range")?;
            print_events(&engine.tick(at, &db))?;
            println!("{}", serde_json::to_string_pretty(&engine.snapshot(at))?);
            store_outcome(&db, &engine)?;
        }
        SessionAction::Watch => {
            let mut engine = load_engine(&db)?;
            if !engine.is_running() {
                print_events(&engine.toggle_running(Utc::now()))?;
            }
            loop {
                let events = engine.tick(Utc::now(), &db);
                print_events(&events)?;
                if matches!(
                    engine.state(),
                    SessionState::Finished | SessionState::Exited
                ) {
                    break;
                }
                save_engine(&db, &engine)?;
                std::thread::sleep(std::time::Duration::from_secs(1));
            }
            store_outcome(&db, &engine)?;
        }
        SessionAction::Exit => {
            let mut engine = load_engine(&db)?;
            print_events(&engine.exit(Utc::now()))?;
            store_outcome(&db, &engine)?;
        }
        SessionAction::Summary => match db.list_sessions(1)?.into_iter().next() {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => println!("No finished sessions"),
        },
    }
    Ok(())
}
