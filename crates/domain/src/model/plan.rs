//! Scheduling inputs and the shared planner result shape.
//!
//! Tasks are ephemeral: the core never persists them, it only allocates them
//! to free time. Both planners (heuristic and LLM-assisted) return the same
//! `PlanResult` so callers can switch via configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Priority;

/// Coarse time-of-day preference for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferredTime {
    Morning,
    Afternoon,
    Evening,
}

impl PreferredTime {
    /// Anchor hour used when scoring slot proximity.
    pub fn anchor_hour(self) -> i64 {
        match self {
            PreferredTime::Morning => 9,
            PreferredTime::Afternoon => 14,
            PreferredTime::Evening => 19,
        }
    }
}

/// A task to be placed on the calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub title: String,
    pub estimated_duration_minutes: u32,
    pub priority: Priority,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub preferred_time: Option<PreferredTime>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// A scheduling constraint. Hard constraints must hold; violating a soft
/// constraint only degrades the plan's confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub kind: String,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_hard: bool,
}

impl Constraint {
    /// The blocked interval, when the constraint carries one.
    pub fn blocked_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if end > start => Some((start, end)),
            _ => None,
        }
    }
}

/// One placed task in a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledBlock {
    pub task_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// The shared planner output contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanResult {
    pub scheduled_events: Vec<ScheduledBlock>,
    pub unscheduled_task_ids: Vec<String>,
    pub warnings: Vec<String>,
    pub reasoning: String,
    /// In `[0, 1]`.
    pub confidence: f64,
}

impl PlanResult {
    /// The plan for an empty task set: nothing to place, full confidence.
    pub fn empty(reasoning: impl Into<String>) -> Self {
        Self {
            scheduled_events: Vec::new(),
            unscheduled_task_ids: Vec::new(),
            warnings: Vec::new(),
            reasoning: reasoning.into(),
            confidence: 1.0,
        }
    }
}
