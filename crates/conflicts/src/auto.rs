//! Rule-based automatic resolution and summary statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resolve::{apply_strategy, Resolution};
use crate::types::{Conflict, ConflictKind, ConflictSeverity, ResolutionStrategy};

/// Which strategy, if any, to auto-apply per conflict kind.
///
/// Severity gates run first: low-severity conflicts always keep the existing
/// event, critical ones are never auto-resolved. Kinds mapped to `None`
/// (recurring, double booking by default) wait for a user decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoResolveRules {
    pub by_kind: BTreeMap<ConflictKind, Option<ResolutionStrategy>>,
}

impl Default for AutoResolveRules {
    fn default() -> Self {
        let mut by_kind = BTreeMap::new();
        by_kind.insert(
            ConflictKind::TimeOverlap,
            Some(ResolutionStrategy::KeepExisting),
        );
        by_kind.insert(
            ConflictKind::Priority,
            Some(ResolutionStrategy::ReplaceWithNew),
        );
        by_kind.insert(ConflictKind::Recurring, None);
        by_kind.insert(ConflictKind::DoubleBooking, None);
        by_kind.insert(ConflictKind::Resource, None);
        Self { by_kind }
    }
}

impl AutoResolveRules {
    fn strategy_for(&self, conflict: &Conflict) -> Option<ResolutionStrategy> {
        match conflict.severity {
            ConflictSeverity::Low => Some(ResolutionStrategy::KeepExisting),
            ConflictSeverity::Critical => None,
            _ => self.by_kind.get(&conflict.kind).copied().flatten(),
        }
    }
}

/// Resolve every conflict the rules cover; the rest are left untouched.
///
/// Idempotent: the produced resolutions are a pure function of the conflicts
/// and rules, so running it twice yields the same list.
pub fn auto_resolve(conflicts: &[Conflict], rules: &AutoResolveRules) -> Vec<Resolution> {
    let mut resolutions = Vec::new();
    for conflict in conflicts {
        let Some(strategy) = rules.strategy_for(conflict) else {
            continue;
        };
        match apply_strategy(conflict, strategy, None) {
            Ok(resolution) => resolutions.push(resolution),
            Err(e) => {
                tracing::warn!(
                    conflict_id = %conflict.id,
                    ?strategy,
                    error = %e,
                    "auto-resolution skipped"
                );
            }
        }
    }
    resolutions
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Statistics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Summary over one detection + resolution pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictStatistics {
    pub total_conflicts: usize,
    pub resolved_conflicts: usize,
    pub unresolved_conflicts: usize,
    pub by_kind: BTreeMap<ConflictKind, usize>,
    pub by_severity: BTreeMap<ConflictSeverity, usize>,
    pub resolution_rate: f64,
}

pub fn conflict_statistics(
    conflicts: &[Conflict],
    resolutions: &[Resolution],
) -> ConflictStatistics {
    let mut by_kind: BTreeMap<ConflictKind, usize> = BTreeMap::new();
    let mut by_severity: BTreeMap<ConflictSeverity, usize> = BTreeMap::new();
    for conflict in conflicts {
        *by_kind.entry(conflict.kind).or_default() += 1;
        *by_severity.entry(conflict.severity).or_default() += 1;
    }

    let resolved = conflicts
        .iter()
        .filter(|c| resolutions.iter().any(|r| r.conflict_id == c.id))
        .count();
    let total = conflicts.len();

    ConflictStatistics {
        total_conflicts: total,
        resolved_conflicts: resolved,
        unresolved_conflicts: total - resolved,
        by_kind,
        by_severity,
        resolution_rate: if total > 0 {
            resolved as f64 / total as f64
        } else {
            0.0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::detect_conflicts;
    use dl_domain::model::{CalendarEvent, EventSource, Priority};

    fn event(id: &str, start: &str, end: &str, priority: Option<Priority>) -> CalendarEvent {
        CalendarEvent {
            id: id.into(),
            user_id: "u1".into(),
            title: id.to_uppercase(),
            start_time: start.parse().unwrap(),
            end_time: end.parse().unwrap(),
            is_all_day: false,
            source: EventSource::External,
            external_id: None,
            is_moveable: false,
            recurrence_rule: None,
            priority,
            description: None,
            timezone: None,
        }
    }

    #[test]
    fn empty_input_resolves_nothing() {
        assert!(auto_resolve(&[], &AutoResolveRules::default()).is_empty());
    }

    #[test]
    fn low_severity_overlap_keeps_existing() {
        let a = event("a", "2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z", None);
        let b = event("b", "2024-01-15T10:30:00Z", "2024-01-15T11:30:00Z", None);
        let conflicts = detect_conflicts(&[a, b], None).conflicts;

        let resolutions = auto_resolve(&conflicts, &AutoResolveRules::default());
        assert_eq!(resolutions.len(), 1);
        assert_eq!(resolutions[0].strategy, ResolutionStrategy::KeepExisting);
        assert_eq!(resolutions[0].resolved_events[0].id, "a");
    }

    #[test]
    fn critical_conflicts_are_left_for_the_user() {
        let a = event(
            "a",
            "2024-01-15T10:00:00Z",
            "2024-01-15T11:00:00Z",
            Some(Priority::Urgent),
        );
        let b = event("b", "2024-01-15T10:30:00Z", "2024-01-15T11:30:00Z", None);
        let conflicts = detect_conflicts(&[a, b], None).conflicts;
        assert!(!conflicts.is_empty());

        let resolutions = auto_resolve(&conflicts, &AutoResolveRules::default());
        assert!(resolutions.is_empty());
    }

    #[test]
    fn high_priority_clash_replaces_with_new() {
        let a = event("a", "2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z", None);
        let b = event(
            "b",
            "2024-01-15T10:30:00Z",
            "2024-01-15T11:30:00Z",
            Some(Priority::High),
        );
        let conflicts = detect_conflicts(&[a, b], None).conflicts;
        let resolutions = auto_resolve(&conflicts, &AutoResolveRules::default());

        let priority_resolution = resolutions
            .iter()
            .find(|r| r.conflict_id.starts_with("priority_"))
            .unwrap();
        assert_eq!(
            priority_resolution.strategy,
            ResolutionStrategy::ReplaceWithNew
        );
        assert_eq!(priority_resolution.resolved_events[0].id, "b");
    }

    #[test]
    fn recurring_conflicts_never_auto_resolve() {
        let mut a = event("a", "2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z", None);
        let mut b = event("b", "2024-01-15T10:30:00Z", "2024-01-15T11:30:00Z", None);
        a.recurrence_rule = Some("FREQ=WEEKLY".into());
        b.recurrence_rule = Some("FREQ=WEEKLY".into());
        let conflicts = detect_conflicts(&[a, b], None).conflicts;

        let resolutions = auto_resolve(&conflicts, &AutoResolveRules::default());
        assert!(resolutions
            .iter()
            .all(|r| !r.conflict_id.starts_with("recurring_")));
    }

    #[test]
    fn auto_resolve_is_idempotent() {
        let a = event("a", "2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z", None);
        let b = event("b", "2024-01-15T10:30:00Z", "2024-01-15T11:30:00Z", None);
        let conflicts = detect_conflicts(&[a, b], None).conflicts;

        let first = auto_resolve(&conflicts, &AutoResolveRules::default());
        let second = auto_resolve(&conflicts, &AutoResolveRules::default());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn statistics_summarize_by_kind_and_severity() {
        let a = event("a", "2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z", None);
        let b = event(
            "b",
            "2024-01-15T10:30:00Z",
            "2024-01-15T11:30:00Z",
            Some(Priority::High),
        );
        let conflicts = detect_conflicts(&[a, b], None).conflicts;
        let resolutions = auto_resolve(&conflicts, &AutoResolveRules::default());

        let stats = conflict_statistics(&conflicts, &resolutions);
        assert_eq!(stats.total_conflicts, 2);
        assert_eq!(stats.by_kind[&ConflictKind::TimeOverlap], 1);
        assert_eq!(stats.by_kind[&ConflictKind::Priority], 1);
        assert_eq!(stats.resolved_conflicts + stats.unresolved_conflicts, 2);
    }

    #[test]
    fn statistics_on_empty_input() {
        let stats = conflict_statistics(&[], &[]);
        assert_eq!(stats.total_conflicts, 0);
        assert_eq!(stats.resolution_rate, 0.0);
    }
}
