//! Routine catalog commands for CLI.

use careloop_core::storage::Database;
use careloop_core::{Routine, TimeOfDay};
use chrono::{Local, Utc};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum RoutineAction {
    /// List routines
    List {
        /// Filter by time of day (morning or evening)
        #[arg(long)]
        time_of_day: Option<String>,
    },
    /// Get routine details
    Show {
        /// Routine ID
        id: String,
    },
    /// Create a new routine
    Create {
        /// Routine name
        #[arg(long)]
        name: Option<String>,
        /// morning or evening
        #[arg(long, default_value = "morning")]
        time_of_day: String,
        /// Seed with the built-in starter steps
        #[arg(long)]
        starter: bool,
    },
    /// Append a step to a routine
    AddStep {
        /// Routine ID
        routine_id: String,
        /// Product name, e.g. "Gentle Cleanser"
        #[arg(long)]
        product: String,
        /// Product category, e.g. "Face Wash"
        #[arg(long, default_value = "")]
        category: String,
        /// Usage instructions
        #[arg(long, default_value = "")]
        instructions: String,
        /// Step duration in seconds
        #[arg(long)]
        duration_secs: u32,
    },
    /// Remove a step from a routine
    RemoveStep {
        /// Routine ID
        routine_id: String,
        /// Step ID
        step_id: String,
    },
    /// Rename a routine
    Rename {
        /// Routine ID
        id: String,
        /// New name
        name: String,
    },
    /// Delete a routine and its steps
    Delete {
        /// Routine ID
        id: String,
    },
    /// Clear completed-today flags left over from earlier days
    Reset,
}

pub fn run(action: RoutineAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        RoutineAction::List { time_of_day } => {
            let filter = time_of_day
                .as_deref()
                .map(|s| s.parse::<TimeOfDay>())
                .transpose()?;
            let routines = db.list_routines(filter)?;
            println!("{}", serde_json::to_string_pretty(&routines)?);
        }
        RoutineAction::Show { id } => match db.get_routine(&id)? {
            Some(routine) => println!("{}", serde_json::to_string_pretty(&routine)?),
            None => println!("Routine not found: {id}"),
        },
        RoutineAction::Create {
            name,
            time_of_day,
            starter,
        } => {
            let tod: TimeOfDay = time_of_day.parse()?;
            let now = Utc::now();
            let mut routine = if starter {
                Routine::starter(tod, now)
            } else {
                Routine::new(
                    name.as_deref()
                        .ok_or("routine create requires --name or --starter")?,
                    tod,
                    now,
                )
            };
            if let Some(name) = name {
                routine.name = name;
            }
            db.create_routine(&routine)?;
            println!("Routine created: {}", routine.id);
            println!("{}", serde_json::to_string_pretty(&routine)?);
        }
        RoutineAction::AddStep {
            routine_id,
            product,
            category,
            instructions,
            duration_secs,
        } => {
            db.get_routine(&routine_id)?
                .ok_or(format!("Routine not found: {routine_id}"))?;
            let step = db.add_step(
                &routine_id,
                &product,
                &category,
                &instructions,
                duration_secs,
                Utc::now(),
            )?;
            println!("Step added: {}", step.id);
            println!("{}", serde_json::to_string_pretty(&step)?);
        }
        RoutineAction::RemoveStep {
            routine_id,
            step_id,
        } => {
            db.remove_step(&routine_id, &step_id, Utc::now())?;
            println!("Step removed: {step_id}");
        }
        RoutineAction::Rename { id, name } => {
            db.get_routine(&id)?
                .ok_or(format!("Routine not found: {id}"))?;
            db.rename_routine(&id, &name, Utc::now())?;
            println!("Routine renamed: {id}");
        }
        RoutineAction::Delete { id } => {
            db.delete_routine(&id)?;
            println!("Routine deleted: {id}");
        }
        RoutineAction::Reset => {
            let refreshed = db.refresh_daily(Local::now().date_naive())?;
            println!("Refreshed {refreshed} routines");
        }
    }
    Ok(())
}
