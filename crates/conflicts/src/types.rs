use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use dl_domain::model::CalendarEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    TimeOverlap,
    DoubleBooking,
    Priority,
    Resource,
    Recurring,
}

impl ConflictKind {
    /// Prefix used when deriving the deterministic conflict id.
    pub fn id_prefix(self) -> &'static str {
        match self {
            ConflictKind::TimeOverlap => "overlap",
            ConflictKind::DoubleBooking => "double_booking",
            ConflictKind::Priority => "priority",
            ConflictKind::Resource => "resource",
            ConflictKind::Recurring => "recurring",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    KeepExisting,
    ReplaceWithNew,
    MergeEvents,
    MoveToAlternativeTime,
    SplitEvent,
    CancelEvent,
    UserDecision,
}

/// A detected incompatibility between two or more events.
///
/// `id` is derived from the kind and the sorted participating event ids, so
/// detection is idempotent: the same input yields byte-identical ids.
/// `events` are ordered by effective start time, earliest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub kind: ConflictKind,
    pub severity: ConflictSeverity,
    pub description: String,
    pub events: Vec<CalendarEvent>,
    pub suggested_strategy: ResolutionStrategy,
    pub allowed_strategies: Vec<ResolutionStrategy>,
    /// Ordered map so serialized conflicts are byte-stable.
    pub metadata: BTreeMap<String, Value>,
}

impl Conflict {
    pub fn event_ids(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn allows(&self, strategy: ResolutionStrategy) -> bool {
        self.allowed_strategies.contains(&strategy)
    }
}

/// The fixed strategy superset for each conflict kind.
pub(crate) fn allowed_strategies(kind: ConflictKind) -> Vec<ResolutionStrategy> {
    use ResolutionStrategy::*;
    match kind {
        ConflictKind::TimeOverlap => vec![
            KeepExisting,
            ReplaceWithNew,
            MergeEvents,
            MoveToAlternativeTime,
            UserDecision,
        ],
        ConflictKind::DoubleBooking => vec![
            KeepExisting,
            ReplaceWithNew,
            MergeEvents,
            SplitEvent,
            CancelEvent,
            UserDecision,
        ],
        ConflictKind::Priority => vec![ReplaceWithNew, KeepExisting, UserDecision],
        ConflictKind::Resource => vec![MoveToAlternativeTime, CancelEvent, UserDecision],
        ConflictKind::Recurring => vec![MoveToAlternativeTime, CancelEvent, UserDecision],
    }
}
