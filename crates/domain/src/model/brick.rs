//! Bricks and Quantas — the durable task model.
//!
//! A Brick is a user goal; Quantas are its actionable steps. Both are value
//! records validated at the constructor and on every patch, so the
//! repository layer never sees an invariant-violating row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const TITLE_MAX_CHARS: usize = 200;
pub const QUANTA_MAX_DURATION_MINUTES: u32 = 1440;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Enumerations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrickCategory {
    Work,
    Personal,
    Health,
    Learning,
    Social,
    Maintenance,
    Recreation,
}

impl BrickCategory {
    /// Parse an external string, normalizing case on ingress.
    pub fn parse(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_lowercase())).map_err(|_| {
            Error::Validation(format!(
                "unknown category '{s}' (expected work, personal, health, learning, social, maintenance or recreation)"
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Numeric rank on the 1 (highest) .. 10 (lowest) scale the planner
    /// scores with.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Urgent => 1,
            Priority::High => 2,
            Priority::Medium => 5,
            Priority::Low => 8,
        }
    }

    pub fn is_elevated(self) -> bool {
        matches!(self, Priority::High | Priority::Urgent)
    }

    pub fn parse(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_lowercase())).map_err(|_| {
            Error::Validation(format!(
                "unknown priority '{s}' (expected low, medium, high or urgent)"
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    NotStarted,
    InProgress,
    Completed,
    Cancelled,
    Postponed,
}

impl LifecycleStatus {
    pub fn parse(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_lowercase())).map_err(|_| {
            Error::Validation(format!(
                "unknown status '{s}' (expected not_started, in_progress, completed, cancelled or postponed)"
            ))
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Brick
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A durable goal owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brick {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: BrickCategory,
    pub priority: Priority,
    pub status: LifecycleStatus,
    pub estimated_duration_minutes: u32,
    #[serde(default)]
    pub target_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating a Brick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBrick {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: BrickCategory,
    pub priority: Priority,
    pub estimated_duration_minutes: u32,
    #[serde(default)]
    pub target_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// Partial update applied through the update tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrickPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<LifecycleStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl NewBrick {
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        if self.estimated_duration_minutes < 1 {
            return Err(Error::Validation(
                "estimated_duration_minutes must be at least 1".into(),
            ));
        }
        validate_date_order(self.target_date, self.deadline)
    }
}

impl Brick {
    pub fn create(id: String, user_id: String, new: NewBrick, now: DateTime<Utc>) -> Result<Self> {
        new.validate()?;
        Ok(Self {
            id,
            user_id,
            title: new.title,
            description: new.description,
            category: new.category,
            priority: new.priority,
            status: LifecycleStatus::NotStarted,
            estimated_duration_minutes: new.estimated_duration_minutes,
            target_date: new.target_date,
            deadline: new.deadline,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a patch, re-checking invariants. The patch is rejected as a
    /// whole when any field is invalid.
    pub fn apply(&mut self, patch: &BrickPatch, now: DateTime<Utc>) -> Result<()> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        self.updated_at = now;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Quanta
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A granular step belonging to exactly one Brick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quanta {
    pub id: String,
    pub brick_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: LifecycleStatus,
    pub estimated_duration_minutes: u32,
    pub order_index: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuanta {
    pub brick_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub estimated_duration_minutes: u32,
    #[serde(default)]
    pub order_index: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuantaPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<LifecycleStatus>,
    #[serde(default)]
    pub estimated_duration_minutes: Option<u32>,
    #[serde(default)]
    pub order_index: Option<u32>,
}

impl NewQuanta {
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        validate_quanta_duration(self.estimated_duration_minutes)
    }
}

impl Quanta {
    pub fn create(id: String, new: NewQuanta, now: DateTime<Utc>) -> Result<Self> {
        new.validate()?;
        Ok(Self {
            id,
            brick_id: new.brick_id,
            title: new.title,
            description: new.description,
            status: LifecycleStatus::NotStarted,
            estimated_duration_minutes: new.estimated_duration_minutes,
            order_index: new.order_index,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply(&mut self, patch: &QuantaPatch, now: DateTime<Utc>) -> Result<()> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        if let Some(minutes) = patch.estimated_duration_minutes {
            validate_quanta_duration(minutes)?;
        }
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(minutes) = patch.estimated_duration_minutes {
            self.estimated_duration_minutes = minutes;
        }
        if let Some(order_index) = patch.order_index {
            self.order_index = order_index;
        }
        self.updated_at = now;
        Ok(())
    }
}

// ── Validation helpers ─────────────────────────────────────────────

fn validate_title(title: &str) -> Result<()> {
    let len = title.chars().count();
    if len == 0 || len > TITLE_MAX_CHARS {
        return Err(Error::Validation(format!(
            "title must be 1-{TITLE_MAX_CHARS} characters, got {len}"
        )));
    }
    Ok(())
}

fn validate_quanta_duration(minutes: u32) -> Result<()> {
    if !(1..=QUANTA_MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(Error::Validation(format!(
            "estimated_duration_minutes must be 1-{QUANTA_MAX_DURATION_MINUTES}, got {minutes}"
        )));
    }
    Ok(())
}

fn validate_date_order(
    target_date: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
) -> Result<()> {
    if let (Some(target), Some(deadline)) = (target_date, deadline) {
        if deadline < target {
            return Err(Error::Validation(
                "deadline must be on or after target_date".into(),
            ));
        }
    }
    Ok(())
}
