//! Strategy application.
//!
//! Resolution never mutates the engine — the caller passes the conflicts it
//! holds and receives a `Resolution` describing which events survive, which
//! are discarded, and which need re-planning.

use serde::{Deserialize, Serialize};

use dl_domain::error::{Error, Result};
use dl_domain::model::CalendarEvent;

use crate::types::{Conflict, ResolutionStrategy};

/// Explicit caller choice for `user_decision` and `cancel_event`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDecision {
    /// Event ids to keep.
    #[serde(default)]
    pub keep: Vec<String>,
    /// Event ids to discard.
    #[serde(default)]
    pub discard: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The outcome of applying a strategy to one conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub conflict_id: String,
    pub strategy: ResolutionStrategy,
    pub resolved_events: Vec<CalendarEvent>,
    pub discarded_events: Vec<CalendarEvent>,
    /// Events the schedule generator should find a new time for.
    #[serde(default)]
    pub reschedule_event_ids: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Apply `strategy` to the conflict with `conflict_id` among `conflicts`.
pub fn resolve_conflict(
    conflicts: &[Conflict],
    conflict_id: &str,
    strategy: ResolutionStrategy,
    user_decision: Option<&UserDecision>,
) -> Result<Resolution> {
    let conflict = conflicts
        .iter()
        .find(|c| c.id == conflict_id)
        .ok_or_else(|| Error::NotFound(format!("conflict '{conflict_id}'")))?;

    if !conflict.allows(strategy) {
        return Err(Error::Validation(format!(
            "strategy {strategy:?} is not allowed for conflict '{conflict_id}'"
        )));
    }

    let resolution = apply_strategy(conflict, strategy, user_decision)?;
    tracing::info!(
        conflict_id,
        ?strategy,
        resolved = resolution.resolved_events.len(),
        discarded = resolution.discarded_events.len(),
        "conflict resolved"
    );
    Ok(resolution)
}

pub(crate) fn apply_strategy(
    conflict: &Conflict,
    strategy: ResolutionStrategy,
    user_decision: Option<&UserDecision>,
) -> Result<Resolution> {
    let events = &conflict.events;
    let notes = user_decision.and_then(|d| d.notes.clone());

    let (resolved, discarded, reschedule) = match strategy {
        // Keep the earliest-started event, discard the rest.
        ResolutionStrategy::KeepExisting => (
            events.first().cloned().into_iter().collect(),
            events.iter().skip(1).cloned().collect(),
            Vec::new(),
        ),

        // Keep the latest-started event, discard the rest.
        ResolutionStrategy::ReplaceWithNew => (
            events.last().cloned().into_iter().collect(),
            events
                .iter()
                .take(events.len().saturating_sub(1))
                .cloned()
                .collect(),
            Vec::new(),
        ),

        ResolutionStrategy::MergeEvents => {
            // Merged envelope; nothing is discarded.
            (vec![merge_events(events)?], Vec::new(), Vec::new())
        }

        // Keep everything; flag all but the earliest for re-planning. The
        // engine never picks the new time itself.
        ResolutionStrategy::MoveToAlternativeTime => (
            events.to_vec(),
            Vec::new(),
            events.iter().skip(1).map(|e| e.id.clone()).collect(),
        ),

        ResolutionStrategy::SplitEvent => split_longest(events)?,

        ResolutionStrategy::CancelEvent => {
            let decision = user_decision.ok_or_else(|| {
                Error::Validation("cancel_event requires a decision naming events to discard".into())
            })?;
            if decision.discard.is_empty() {
                return Err(Error::Validation(
                    "cancel_event requires at least one event id to discard".into(),
                ));
            }
            let (discarded, resolved): (Vec<_>, Vec<_>) = events
                .iter()
                .cloned()
                .partition(|e| decision.discard.contains(&e.id));
            if discarded.is_empty() {
                return Err(Error::NotFound(
                    "none of the named events participate in this conflict".into(),
                ));
            }
            (resolved, discarded, Vec::new())
        }

        ResolutionStrategy::UserDecision => match user_decision {
            Some(decision) => {
                let discarded: Vec<CalendarEvent> = events
                    .iter()
                    .filter(|e| decision.discard.contains(&e.id))
                    .cloned()
                    .collect();
                // Unmentioned events default to kept.
                let resolved: Vec<CalendarEvent> = events
                    .iter()
                    .filter(|e| !decision.discard.contains(&e.id))
                    .cloned()
                    .collect();
                (resolved, discarded, Vec::new())
            }
            // No decision supplied: keep everything, resolve nothing away.
            None => (events.to_vec(), Vec::new(), Vec::new()),
        },
    };

    Ok(Resolution {
        conflict_id: conflict.id.clone(),
        strategy,
        resolved_events: resolved,
        discarded_events: discarded,
        reschedule_event_ids: reschedule,
        notes,
    })
}

/// Merge the conflict's events into one envelope event: earliest start,
/// latest end, titles joined with `|`, non-empty descriptions joined with `|`.
fn merge_events(events: &[CalendarEvent]) -> Result<CalendarEvent> {
    let first = events
        .first()
        .ok_or_else(|| Error::Internal("merge of empty conflict".into()))?;

    let mut merged = first.clone();
    merged.title = events
        .iter()
        .map(|e| e.title.as_str())
        .collect::<Vec<_>>()
        .join("|");
    merged.start_time = events
        .iter()
        .map(|e| e.start_time)
        .min()
        .unwrap_or(first.start_time);
    merged.end_time = events
        .iter()
        .map(|e| e.end_time)
        .max()
        .unwrap_or(first.end_time);

    let descriptions: Vec<&str> = events
        .iter()
        .filter_map(|e| e.description.as_deref())
        .filter(|d| !d.is_empty())
        .collect();
    merged.description = if descriptions.is_empty() {
        None
    } else {
        Some(descriptions.join("|"))
    };
    Ok(merged)
}

type StrategyOutcome = (Vec<CalendarEvent>, Vec<CalendarEvent>, Vec<String>);

/// Partition the longest event into the parts of its span not covered by the
/// other events. The fragments replace the original; zero-length fragments
/// are dropped.
fn split_longest(events: &[CalendarEvent]) -> Result<StrategyOutcome> {
    let longest = events
        .iter()
        .max_by_key(|e| (e.end_time - e.start_time, std::cmp::Reverse(e.id.clone())))
        .ok_or_else(|| Error::Internal("split of empty conflict".into()))?;

    let others: Vec<&CalendarEvent> = events.iter().filter(|e| e.id != longest.id).collect();

    let mut fragments = Vec::new();
    let mut cursor = longest.start_time;
    let mut blockers: Vec<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> =
        others.iter().map(|e| (e.start_time, e.end_time)).collect();
    blockers.sort();

    for (block_start, block_end) in blockers {
        if block_start > cursor {
            fragments.push((cursor, block_start.min(longest.end_time)));
        }
        cursor = cursor.max(block_end);
        if cursor >= longest.end_time {
            break;
        }
    }
    if cursor < longest.end_time {
        fragments.push((cursor, longest.end_time));
    }

    let mut resolved: Vec<CalendarEvent> = others.into_iter().cloned().collect();
    for (idx, (start, end)) in fragments.iter().filter(|(s, e)| e > s).enumerate() {
        let mut fragment = longest.clone();
        fragment.id = format!("{}#{}", longest.id, idx + 1);
        fragment.start_time = *start;
        fragment.end_time = *end;
        resolved.push(fragment);
    }

    Ok((resolved, vec![longest.clone()], Vec::new()))
}
