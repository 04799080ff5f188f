use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Evening,
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeOfDay::Morning => write!(f, "morning"),
            TimeOfDay::Evening => write!(f, "evening"),
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morning" => Ok(TimeOfDay::Morning),
            "evening" => Ok(TimeOfDay::Evening),
            other => Err(format!("unknown time of day: {other}")),
        }
    }
}

/// One timed activity within a routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineStep {
    pub id: String,
    pub routine_id: String,
    /// Display name of the product, e.g. "Gentle Cleanser".
    pub product_name: String,
    /// Product category, e.g. "Face Wash".
    pub category: String,
    #[serde(default)]
    pub instructions: String,
    /// Duration in whole seconds. Must be at least 1 to be timed.
    pub duration_secs: u32,
    /// Position within the routine, dense 0..n-1.
    pub order_index: u32,
    /// Per-session completion flag. Reset when a session starts.
    #[serde(default)]
    pub is_completed: bool,
}

impl RoutineStep {
    pub fn new(
        routine_id: &str,
        product_name: &str,
        category: &str,
        instructions: &str,
        duration_secs: u32,
        order_index: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            routine_id: routine_id.to_string(),
            product_name: product_name.to_string(),
            category: category.to_string(),
            instructions: instructions.to_string(),
            duration_secs,
            order_index,
            is_completed: false,
        }
    }
}

/// A named, ordered list of skincare steps for one part of the day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub id: String,
    pub name: String,
    pub time_of_day: TimeOfDay,
    pub is_active: bool,
    /// Set when a session finishes this routine; cleared on the next day.
    pub completed_today: bool,
    pub steps: Vec<RoutineStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Routine {
    pub fn new(name: &str, time_of_day: TimeOfDay, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            time_of_day,
            is_active: true,
            completed_today: false,
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The built-in starter routine for the given time of day.
    pub fn starter(time_of_day: TimeOfDay, now: DateTime<Utc>) -> Self {
        let name = match time_of_day {
            TimeOfDay::Morning => "Morning Routine",
            TimeOfDay::Evening => "Evening Routine",
        };
        let mut routine = Self::new(name, time_of_day, now);
        let specs: &[(&str, &str, &str, u32)] = match time_of_day {
            TimeOfDay::Morning => &[
                (
                    "Gentle Cleanser",
                    "Face Wash",
                    "Gently massage onto damp skin for 30 seconds",
                    30,
                ),
                (
                    "Moisturizer",
                    "Daily Moisturizer",
                    "Apply evenly to face and neck",
                    15,
                ),
                (
                    "SPF 30+",
                    "Sunscreen",
                    "Apply liberally and evenly to all exposed areas",
                    15,
                ),
            ],
            TimeOfDay::Evening => &[
                (
                    "Cleanser",
                    "Face Wash",
                    "Gently massage onto damp skin for 30 seconds",
                    30,
                ),
                (
                    "Treatment Serum",
                    "Night Serum",
                    "Apply 2-3 drops and gently pat in",
                    30,
                ),
                (
                    "Night Moisturizer",
                    "Night Cream",
                    "Apply generously for overnight hydration",
                    15,
                ),
            ],
        };
        routine.steps = specs
            .iter()
            .enumerate()
            .map(|(i, (product, category, instructions, secs))| {
                RoutineStep::new(&routine.id, product, category, instructions, *secs, i as u32)
            })
            .collect();
        routine
    }

    /// Steps in presentation order.
    pub fn sorted_steps(&self) -> Vec<RoutineStep> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(|s| s.order_index);
        steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn total_duration_secs(&self) -> u32 {
        self.steps.iter().map(|s| s.duration_secs).sum()
    }

    pub fn completed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_completed).count()
    }
}
