//! Conflict detection.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use dl_domain::model::{CalendarEvent, Priority};

use crate::types::{
    allowed_strategies, Conflict, ConflictKind, ConflictSeverity, ResolutionStrategy,
};

/// Result of one detection pass.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    /// Conflicts sorted by id, deduplicated, deterministic.
    pub conflicts: Vec<Conflict>,
    /// Events that could not be compared (invariant-violating spans).
    pub skipped_event_ids: Vec<String>,
}

struct Span<'a> {
    event: &'a CalendarEvent,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Detect overlap, priority, recurring, and double-booking conflicts.
///
/// Pure and idempotent: calling it twice on the same input yields the same
/// conflict set by id, independent of input order. Two events are compared
/// when their starts are within one day of each other, or when both fall
/// inside `window`.
pub fn detect_conflicts(
    events: &[CalendarEvent],
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> Detection {
    let mut skipped_event_ids: Vec<String> = Vec::new();
    let mut spans: Vec<Span> = Vec::new();

    for event in events {
        if event.validate().is_err() {
            skipped_event_ids.push(event.id.clone());
            continue;
        }
        let (start, end) = event.effective_span();
        spans.push(Span { event, start, end });
    }
    skipped_event_ids.sort();

    // Sort ascending by effective start, stable tie-break on id.
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(a.event.id.cmp(&b.event.id)));

    let mut conflicts: Vec<Conflict> = Vec::new();

    // ── Pairwise pass: overlap, priority, recurring ──────────────────
    for i in 0..spans.len() {
        for j in 0..i {
            let (older, newer) = (&spans[j], &spans[i]);
            if !should_compare(older, newer, window) {
                continue;
            }
            if !overlaps(older, newer) {
                continue;
            }

            let pair = [older, newer];
            conflicts.push(overlap_conflict(&pair));

            if is_priority_clash(older.event, newer.event) {
                conflicts.push(priority_conflict(&pair));
            }

            if older.event.is_recurring() && newer.event.is_recurring() {
                conflicts.push(recurring_conflict(&pair));
            }
        }
    }

    // ── Cluster pass: double booking ─────────────────────────────────
    for cluster in overlap_clusters(&spans) {
        let members: Vec<&Span> = spans
            .iter()
            .filter(|s| cluster.contains(&s.event.id))
            .collect();
        conflicts.push(double_booking_conflict(&members));
    }

    conflicts.sort_by(|a, b| a.id.cmp(&b.id));
    conflicts.dedup_by(|a, b| a.id == b.id);

    tracing::debug!(
        total_events = events.len(),
        conflicts_found = conflicts.len(),
        skipped = skipped_event_ids.len(),
        "conflict detection completed"
    );

    Detection {
        conflicts,
        skipped_event_ids,
    }
}

fn should_compare(a: &Span, b: &Span, window: Option<(DateTime<Utc>, DateTime<Utc>)>) -> bool {
    let gap = (a.start - b.start).abs();
    if gap <= Duration::days(1) {
        return true;
    }
    if let Some((from, to)) = window {
        return (from..=to).contains(&a.start) && (from..=to).contains(&b.start);
    }
    false
}

/// Half-open overlap: touching boundaries (`end_a == start_b`) do not clash.
fn overlaps(a: &Span, b: &Span) -> bool {
    a.start < b.end && a.end > b.start
}

fn effective_priority(event: &CalendarEvent) -> Priority {
    event.priority.unwrap_or(Priority::Medium)
}

fn is_priority_clash(a: &CalendarEvent, b: &CalendarEvent) -> bool {
    let (pa, pb) = (effective_priority(a), effective_priority(b));
    let low_side = |p: Priority| matches!(p, Priority::Low | Priority::Medium);
    (pa.is_elevated() && low_side(pb)) || (pb.is_elevated() && low_side(pa))
}

// ── Conflict construction ──────────────────────────────────────────

fn conflict_id(kind: ConflictKind, events: &[&Span]) -> String {
    let mut ids: Vec<&str> = events.iter().map(|s| s.event.id.as_str()).collect();
    ids.sort();
    format!("{}_{}", kind.id_prefix(), ids.join("_"))
}

/// Minutes the events all share, clamped at zero.
fn common_overlap_minutes(events: &[&Span]) -> i64 {
    let latest_start = events.iter().map(|s| s.start).max();
    let earliest_end = events.iter().map(|s| s.end).min();
    match (latest_start, earliest_end) {
        (Some(start), Some(end)) if start < end => (end - start).num_minutes(),
        _ => 0,
    }
}

fn severity_of(events: &[&Span]) -> ConflictSeverity {
    let priorities: Vec<Priority> = events.iter().map(|s| effective_priority(s.event)).collect();
    if priorities.contains(&Priority::Urgent) {
        ConflictSeverity::Critical
    } else if priorities.contains(&Priority::High) {
        ConflictSeverity::High
    } else if events.len() > 2 {
        ConflictSeverity::Medium
    } else {
        ConflictSeverity::Low
    }
}

fn suggestion_for(events: &[&Span]) -> ResolutionStrategy {
    if events
        .iter()
        .any(|s| effective_priority(s.event).is_elevated())
    {
        ResolutionStrategy::ReplaceWithNew
    } else if events.len() > 2 {
        ResolutionStrategy::UserDecision
    } else {
        ResolutionStrategy::KeepExisting
    }
}

fn base_conflict(kind: ConflictKind, events: &[&Span], description: String) -> Conflict {
    let mut metadata = std::collections::BTreeMap::new();
    metadata.insert(
        "overlap_duration".into(),
        json!(common_overlap_minutes(events)),
    );
    metadata.insert("event_count".into(), json!(events.len()));

    Conflict {
        id: conflict_id(kind, events),
        kind,
        severity: severity_of(events),
        description,
        events: events.iter().map(|s| s.event.clone()).collect(),
        suggested_strategy: suggestion_for(events),
        allowed_strategies: allowed_strategies(kind),
        metadata,
    }
}

fn overlap_conflict(pair: &[&Span; 2]) -> Conflict {
    let minutes = common_overlap_minutes(pair);
    let description = format!(
        "'{}' overlaps with '{}' for {minutes} minutes",
        pair[0].event.title, pair[1].event.title
    );
    base_conflict(ConflictKind::TimeOverlap, pair, description)
}

fn priority_conflict(pair: &[&Span; 2]) -> Conflict {
    let mut conflict = base_conflict(
        ConflictKind::Priority,
        pair,
        "High priority event conflicts with lower priority event".into(),
    );
    conflict.suggested_strategy = ResolutionStrategy::ReplaceWithNew;
    conflict
        .metadata
        .insert("priority_difference".into(), json!("elevated_vs_lower"));
    conflict
}

fn recurring_conflict(pair: &[&Span; 2]) -> Conflict {
    let mut conflict = base_conflict(
        ConflictKind::Recurring,
        pair,
        "Recurring events conflict with each other".into(),
    );
    // Recurring clashes repeat every cycle; never below high.
    if conflict.severity < ConflictSeverity::High {
        conflict.severity = ConflictSeverity::High;
    }
    conflict.suggested_strategy = ResolutionStrategy::UserDecision;
    conflict.metadata.insert("recurring_events".into(), json!(true));
    conflict
}

fn double_booking_conflict(members: &[&Span]) -> Conflict {
    let minutes = common_overlap_minutes(members);
    let first_title = members
        .first()
        .map(|s| s.event.title.as_str())
        .unwrap_or_default();
    let description = format!(
        "{} events overlap including '{first_title}' for {minutes} minutes",
        members.len()
    );
    base_conflict(ConflictKind::DoubleBooking, members, description)
}

// ── Double-booking sweep ───────────────────────────────────────────

/// Maximal sets of three or more events that are simultaneously active on a
/// common window. Sweeps span boundaries, collects the active set in each
/// interval, and drops sets that are strict subsets of another.
fn overlap_clusters(spans: &[Span]) -> Vec<BTreeSet<String>> {
    let mut boundaries: Vec<DateTime<Utc>> = spans
        .iter()
        .flat_map(|s| [s.start, s.end])
        .collect();
    boundaries.sort();
    boundaries.dedup();

    let mut sets: BTreeSet<Vec<String>> = BTreeSet::new();
    for pair in boundaries.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let mut active: Vec<String> = spans
            .iter()
            .filter(|s| s.start <= from && s.end >= to)
            .map(|s| s.event.id.clone())
            .collect();
        if active.len() >= 3 {
            active.sort();
            sets.insert(active);
        }
    }

    let all: Vec<BTreeSet<String>> = sets
        .into_iter()
        .map(|ids| ids.into_iter().collect())
        .collect();
    all.iter()
        .filter(|set| {
            !all.iter()
                .any(|other| other.len() > set.len() && set.is_subset(other))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dl_domain::model::EventSource;

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
    fn overlapping_pair_produces_overlap_conflict() {
        // Scenario: a medium 10:00-11:00 event against a high 10:30-11:30 one.
        let a = event(
            "a",
            "2024-01-15T10:00:00Z",
            "2024-01-15T11:00:00Z",
            Some(Priority::Medium),
        );
        let b = event(
            "b",
            "2024-01-15T10:30:00Z",
            "2024-01-15T11:30:00Z",
            Some(Priority::High),
        );

        let detection = detect_conflicts(&[a, b], None);
        let overlap: Vec<&Conflict> = detection
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::TimeOverlap)
            .collect();
        assert_eq!(overlap.len(), 1);

        let conflict = overlap[0];
        assert_eq!(conflict.id, "overlap_a_b");
        assert_eq!(conflict.severity, ConflictSeverity::High);
        assert_eq!(conflict.suggested_strategy, ResolutionStrategy::ReplaceWithNew);
        assert_eq!(conflict.metadata["overlap_duration"], json!(30));
        // Earliest-started event first.
        assert_eq!(conflict.events[0].id, "a");
    }

    #[test]
    fn elevated_vs_lower_also_flags_priority_conflict() {
        let a = event(
            "a",
            "2024-01-15T10:00:00Z",
            "2024-01-15T11:00:00Z",
            Some(Priority::Medium),
        );
        let b = event(
            "b",
            "2024-01-15T10:30:00Z",
            "2024-01-15T11:30:00Z",
            Some(Priority::High),
        );

        let detection = detect_conflicts(&[a, b], None);
        let priority: Vec<&Conflict> = detection
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::Priority)
            .collect();
        assert_eq!(priority.len(), 1);
        assert_eq!(priority[0].id, "priority_a_b");
        assert_eq!(
            priority[0].suggested_strategy,
            ResolutionStrategy::ReplaceWithNew
        );
    }

    #[test]
    fn equal_priorities_do_not_flag_priority_conflict() {
        let a = event(
            "a",
            "2024-01-15T10:00:00Z",
            "2024-01-15T11:00:00Z",
            Some(Priority::High),
        );
        let b = event(
            "b",
            "2024-01-15T10:30:00Z",
            "2024-01-15T11:30:00Z",
            Some(Priority::Urgent),
        );
        let detection = detect_conflicts(&[a, b], None);
        assert!(detection
            .conflicts
            .iter()
            .all(|c| c.kind != ConflictKind::Priority));
    }

    #[test]
    fn touching_boundaries_are_not_a_conflict() {
        let a = event("a", "2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z", None);
        let b = event("b", "2024-01-15T11:00:00Z", "2024-01-15T12:00:00Z", None);
        let detection = detect_conflicts(&[a, b], None);
        assert!(detection.conflicts.is_empty());
    }

    #[test]
    fn detection_is_order_independent() {
        let a = event("a", "2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z", None);
        let b = event(
            "b",
            "2024-01-15T10:30:00Z",
            "2024-01-15T11:30:00Z",
            Some(Priority::Urgent),
        );
        let c = event("c", "2024-01-15T10:45:00Z", "2024-01-15T12:00:00Z", None);

        let forward = detect_conflicts(&[a.clone(), b.clone(), c.clone()], None);
        let reversed = detect_conflicts(&[c, b, a], None);

        let ids = |d: &Detection| d.conflicts.iter().map(|c| c.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&forward), ids(&reversed));
    }

    #[test]
    fn detection_is_idempotent() {
        let events = vec![
            event("a", "2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z", None),
            event("b", "2024-01-15T10:30:00Z", "2024-01-15T11:30:00Z", None),
        ];
        let first = detect_conflicts(&events, None);
        let second = detect_conflicts(&events, None);
        assert_eq!(
            serde_json::to_string(&first.conflicts).unwrap(),
            serde_json::to_string(&second.conflicts).unwrap()
        );
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let detection = detect_conflicts(&[], None);
        assert!(detection.conflicts.is_empty());
        assert!(detection.skipped_event_ids.is_empty());
    }

    #[test]
    fn invalid_events_are_skipped_and_reported() {
        let good_a = event("a", "2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z", None);
        let good_b = event("b", "2024-01-15T10:30:00Z", "2024-01-15T11:30:00Z", None);
        // end before start — cannot be compared.
        let bad = event("zz", "2024-01-15T12:00:00Z", "2024-01-15T10:00:00Z", None);

        let detection = detect_conflicts(&[good_a, bad, good_b], None);
        assert_eq!(detection.skipped_event_ids, vec!["zz"]);
        assert_eq!(detection.conflicts.len(), 1);
    }

    #[test]
    fn three_way_overlap_emits_double_booking() {
        let a = event("a", "2024-01-15T10:00:00Z", "2024-01-15T12:00:00Z", None);
        let b = event("b", "2024-01-15T10:30:00Z", "2024-01-15T11:30:00Z", None);
        let c = event("c", "2024-01-15T11:00:00Z", "2024-01-15T13:00:00Z", None);

        let detection = detect_conflicts(&[a, b, c], None);
        let booking: Vec<&Conflict> = detection
            .conflicts
            .iter()
            .filter(|conflict| conflict.kind == ConflictKind::DoubleBooking)
            .collect();
        assert_eq!(booking.len(), 1);
        assert_eq!(booking[0].id, "double_booking_a_b_c");
        assert_eq!(booking[0].severity, ConflictSeverity::Medium);
        assert_eq!(
            booking[0].suggested_strategy,
            ResolutionStrategy::UserDecision
        );
        // All three share 11:00-11:30.
        assert_eq!(booking[0].metadata["overlap_duration"], json!(30));
    }

    #[test]
    fn disjoint_triple_does_not_double_book() {
        // a-b overlap and b-c overlap, but no instant has all three active.
        let a = event("a", "2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z", None);
        let b = event("b", "2024-01-15T10:30:00Z", "2024-01-15T12:00:00Z", None);
        let c = event("c", "2024-01-15T11:30:00Z", "2024-01-15T12:30:00Z", None);

        let detection = detect_conflicts(&[a, b, c], None);
        assert!(detection
            .conflicts
            .iter()
            .all(|conflict| conflict.kind != ConflictKind::DoubleBooking));
    }

    #[test]
    fn recurring_pair_flags_recurring_conflict() {
        let mut a = event("a", "2024-01-15T10:00:00Z", "2024-01-15T11:00:00Z", None);
        let mut b = event("b", "2024-01-15T10:30:00Z", "2024-01-15T11:30:00Z", None);
        a.recurrence_rule = Some("FREQ=WEEKLY".into());
        b.recurrence_rule = Some("FREQ=WEEKLY".into());

        let detection = detect_conflicts(&[a, b], None);
        let recurring: Vec<&Conflict> = detection
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::Recurring)
            .collect();
        assert_eq!(recurring.len(), 1);
        assert_eq!(recurring[0].severity, ConflictSeverity::High);
    }

    #[test]
    fn all_day_events_conflict_when_day_sets_intersect() {
        let mut a = event("a", "2024-01-15T09:00:00Z", "2024-01-15T09:00:00Z", None);
        a.is_all_day = true;
        let mut b = event("b", "2024-01-15T22:00:00Z", "2024-01-15T22:00:00Z", None);
        b.is_all_day = true;
        let mut c = event("c", "2024-01-17T01:00:00Z", "2024-01-17T01:00:00Z", None);
        c.is_all_day = true;

        let detection = detect_conflicts(&[a, b, c], None);
        assert_eq!(detection.conflicts.len(), 1);
        assert_eq!(detection.conflicts[0].id, "overlap_a_b");
    }

    #[test]
    fn distant_starts_only_compared_inside_window() {
        // A three-day event against one starting two days later: the starts
        // are more than a day apart, so the pair is only examined when both
        // fall inside an explicit window.
        let long = event("long", "2024-01-15T00:00:00Z", "2024-01-18T00:00:00Z", None);
        let late = event("late", "2024-01-17T10:00:00Z", "2024-01-17T11:00:00Z", None);

        let without = detect_conflicts(&[long.clone(), late.clone()], None);
        assert!(without.conflicts.is_empty());

        let window = Some((
            "2024-01-14T00:00:00Z".parse().unwrap(),
            "2024-01-20T00:00:00Z".parse().unwrap(),
        ));
        let within = detect_conflicts(&[long, late], window);
        assert_eq!(within.conflicts.len(), 1);
        assert_eq!(within.conflicts[0].id, "overlap_late_long");
    }

    #[test]
    fn urgent_participant_makes_severity_critical() {
        let a = event(
            "a",
            "2024-01-15T10:00:00Z",
            "2024-01-15T11:00:00Z",
            Some(Priority::Urgent),
        );
        let b = event("b", "2024-01-15T10:30:00Z", "2024-01-15T11:30:00Z", None);
        let detection = detect_conflicts(&[a, b], None);
        let overlap = detection
            .conflicts
            .iter()
            .find(|c| c.kind == ConflictKind::TimeOverlap)
            .unwrap();
        assert_eq!(overlap.severity, ConflictSeverity::Critical);
    }
}
