//! Greedy priority planner.
//!
//! Deterministic: given the same request and the same `Clock::now()`, the
//! produced plan is byte-identical. Used directly in heuristic mode and as
//! the fallback when the LLM planner fails.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;

use dl_domain::clock::Clock;
use dl_domain::error::{Error, Result};
use dl_domain::model::{PlanResult, ScheduledBlock, TaskSpec};

use crate::slots::{candidate_slots, Slot};
use crate::{PlanRequest, Planner};

pub struct HeuristicPlanner {
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl Planner for HeuristicPlanner {
    async fn plan(&self, req: &PlanRequest) -> Result<PlanResult> {
        self.plan_now(req)
    }
}

impl HeuristicPlanner {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Synchronous entry point; the algorithm never suspends.
    pub fn plan_now(&self, req: &PlanRequest) -> Result<PlanResult> {
        req.preferences.validate()?;

        if req.tasks.is_empty() {
            return Ok(PlanResult::empty("No tasks to schedule."));
        }

        // A hard constraint we cannot express as a blocked window cannot be
        // honored, which fails the whole plan.
        for constraint in req.constraints.iter().filter(|c| c.is_hard) {
            if constraint.blocked_span().is_none() {
                return Err(Error::Validation(format!(
                    "hard constraint '{}' has no actionable time window",
                    constraint_label(constraint)
                )));
            }
        }

        let now = self.clock.now();
        let tz = req.preferences.timezone;

        let mut blocked: Vec<(DateTime<Utc>, DateTime<Utc>)> = req
            .existing_events
            .iter()
            .map(|e| e.effective_span())
            .collect();
        blocked.extend(
            req.constraints
                .iter()
                .filter(|c| c.is_hard)
                .filter_map(|c| c.blocked_span()),
        );

        let mut slots = candidate_slots(now, req.horizon_days, &req.preferences, &blocked);
        slots.sort_by_key(|s| s.start);

        let mut scheduled: Vec<ScheduledBlock> = Vec::new();
        let mut placements: HashMap<String, (DateTime<Utc>, DateTime<Utc>)> = HashMap::new();
        let mut unscheduled: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        // Worklist over the ordered tasks: a task whose dependencies aren't
        // settled yet is deferred to a later round; no progress means the
        // remaining dependency graph is cyclic or dangling.
        let mut pending = ordered_tasks(&req.tasks);
        let known_ids: std::collections::HashSet<&str> =
            req.tasks.iter().map(|t| t.id.as_str()).collect();

        loop {
            let mut deferred: Vec<&TaskSpec> = Vec::new();
            let mut progressed = false;

            for task in pending {
                match dependency_floor(task, &placements, &unscheduled, &known_ids) {
                    DependencyState::Ready(min_start) => {
                        progressed = true;
                        self.place_task(
                            task,
                            min_start,
                            tz,
                            &req.preferences.avoid_after,
                            &mut slots,
                            &mut scheduled,
                            &mut placements,
                            &mut unscheduled,
                            &mut warnings,
                        );
                    }
                    DependencyState::Blocked(reason) => {
                        progressed = true;
                        unscheduled.push(task.id.clone());
                        warnings.push(format!(
                            "could not schedule '{}' ({}): {reason}",
                            task.title, task.id
                        ));
                    }
                    DependencyState::Waiting => deferred.push(task),
                }
            }

            if deferred.is_empty() {
                break;
            }
            if !progressed {
                for task in &deferred {
                    unscheduled.push(task.id.clone());
                    warnings.push(format!(
                        "could not schedule '{}' ({}): circular dependency",
                        task.title, task.id
                    ));
                }
                break;
            }
            pending = deferred;
        }

        scheduled.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.task_id.cmp(&b.task_id)));

        let soft_violations = count_soft_violations(&scheduled, req);
        let confidence = confidence_score(req.tasks.len(), scheduled.len(), soft_violations);

        let reasoning = format!(
            "Placed {}/{} tasks over a {}-day horizon by priority rank, deadline pressure, and slot fitness.",
            scheduled.len(),
            req.tasks.len(),
            req.horizon_days
        );

        tracing::debug!(
            tasks = req.tasks.len(),
            scheduled = scheduled.len(),
            unscheduled = unscheduled.len(),
            soft_violations,
            "heuristic plan complete"
        );

        Ok(PlanResult {
            scheduled_events: scheduled,
            unscheduled_task_ids: unscheduled,
            warnings,
            reasoning,
            confidence,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn place_task(
        &self,
        task: &TaskSpec,
        min_start: Option<DateTime<Utc>>,
        tz: Tz,
        avoid_after: &Option<chrono::NaiveTime>,
        slots: &mut Vec<Slot>,
        scheduled: &mut Vec<ScheduledBlock>,
        placements: &mut HashMap<String, (DateTime<Utc>, DateTime<Utc>)>,
        unscheduled: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        let duration = Duration::minutes(i64::from(task.estimated_duration_minutes));

        let mut best: Option<(usize, DateTime<Utc>, f64)> = None;
        for (idx, slot) in slots.iter().enumerate() {
            let start = match min_start {
                Some(floor) => slot.start.max(floor),
                None => slot.start,
            };
            if start + duration > slot.end {
                continue;
            }
            if let Some(cutoff) = avoid_after {
                if start.with_timezone(&tz).time() >= *cutoff {
                    continue;
                }
            }

            let score = fitness(task, slot, start, tz);
            // Strictly-greater keeps the earliest slot on ties.
            if best.map_or(true, |(_, _, best_score)| score > best_score + f64::EPSILON) {
                best = Some((idx, start, score));
            }
        }

        let Some((idx, start, _)) = best else {
            unscheduled.push(task.id.clone());
            warnings.push(format!(
                "could not schedule '{}' ({}): no free slot fits {} minutes",
                task.title, task.id, task.estimated_duration_minutes
            ));
            return;
        };

        let end = start + duration;
        let slot = slots.remove(idx);
        if slot.start < start {
            slots.push(Slot {
                start: slot.start,
                end: start,
            });
        }
        if end < slot.end {
            slots.push(Slot {
                start: end,
                end: slot.end,
            });
        }
        slots.sort_by_key(|s| s.start);

        placements.insert(task.id.clone(), (start, end));
        scheduled.push(ScheduledBlock {
            task_id: task.id.clone(),
            title: task.title.clone(),
            start_time: start,
            end_time: end,
            priority: Some(task.priority),
        });
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ordering and scoring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stable order: priority rank ascending, deadline ascending (absent last),
/// duration descending.
fn ordered_tasks(tasks: &[TaskSpec]) -> Vec<&TaskSpec> {
    let mut ordered: Vec<&TaskSpec> = tasks.iter().collect();
    ordered.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then_with(|| match (a.deadline, b.deadline) {
                (Some(da), Some(db)) => da.cmp(&db),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| b.estimated_duration_minutes.cmp(&a.estimated_duration_minutes))
    });
    ordered
}

enum DependencyState {
    /// All dependencies settled; tasks may start no earlier than the instant.
    Ready(Option<DateTime<Utc>>),
    /// A dependency can never be satisfied.
    Blocked(String),
    /// A dependency has not been processed yet.
    Waiting,
}

fn dependency_floor(
    task: &TaskSpec,
    placements: &HashMap<String, (DateTime<Utc>, DateTime<Utc>)>,
    unscheduled: &[String],
    known_ids: &std::collections::HashSet<&str>,
) -> DependencyState {
    let mut floor: Option<DateTime<Utc>> = None;
    for dep in &task.dependencies {
        if let Some((_, dep_end)) = placements.get(dep) {
            floor = Some(floor.map_or(*dep_end, |f| f.max(*dep_end)));
        } else if unscheduled.contains(dep) {
            return DependencyState::Blocked(format!("dependency '{dep}' is unscheduled"));
        } else if !known_ids.contains(dep.as_str()) {
            return DependencyState::Blocked(format!("dependency '{dep}' is unknown"));
        } else {
            return DependencyState::Waiting;
        }
    }
    DependencyState::Ready(floor)
}

/// How well a slot fits a task; higher is better.
fn fitness(task: &TaskSpec, slot: &Slot, start: DateTime<Utc>, tz: Tz) -> f64 {
    let mut score = 0.0;

    // Deadline pressure: approaching deadlines pull the task forward.
    if let Some(deadline) = task.deadline {
        let hours_left = (deadline - start).num_seconds() as f64 / 3600.0;
        if hours_left > 0.0 {
            score += 100.0 / (1.0 + hours_left / 24.0);
        }
    }

    let local = start.with_timezone(&tz);

    if let Some(preferred) = task.preferred_time {
        let hour_diff = (preferred.anchor_hour() - i64::from(local.hour())).abs();
        score += 50.0 / (1.0 + hour_diff as f64);
    }

    score += f64::from(11 - i32::from(task.priority.rank())) * 10.0;

    if task.priority.is_elevated() && local.hour() < 12 {
        score += 20.0;
    }

    // Prefer slots that will not be fragmented by this placement.
    let remaining_minutes = (slot.end - start).num_minutes() as f64;
    if remaining_minutes >= f64::from(task.estimated_duration_minutes) * 1.5 {
        score += 10.0;
    }

    score
}

fn count_soft_violations(scheduled: &[ScheduledBlock], req: &PlanRequest) -> usize {
    let soft_blocks: Vec<(DateTime<Utc>, DateTime<Utc>)> = req
        .constraints
        .iter()
        .filter(|c| !c.is_hard)
        .filter_map(|c| c.blocked_span())
        .collect();

    scheduled
        .iter()
        .filter(|block| {
            soft_blocks
                .iter()
                .any(|(start, end)| block.start_time < *end && block.end_time > *start)
        })
        .count()
}

/// `0.3 + 0.6·scheduled_fraction − 0.1·soft_ratio`, clamped to `[0, 1]`;
/// a fully placed, violation-free plan reports full confidence.
fn confidence_score(total: usize, scheduled: usize, soft_violations: usize) -> f64 {
    if total == 0 || (scheduled == total && soft_violations == 0) {
        return 1.0;
    }
    let fraction = scheduled as f64 / total as f64;
    let soft_ratio = soft_violations as f64 / scheduled.max(1) as f64;
    (0.3 + 0.6 * fraction - 0.1 * soft_ratio).clamp(0.0, 1.0)
}

fn constraint_label(constraint: &dl_domain::model::Constraint) -> &str {
    if constraint.description.is_empty() {
        &constraint.kind
    } else {
        &constraint.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dl_domain::clock::FixedClock;
    use dl_domain::model::{
        CalendarEvent, Constraint, EventSource, Preferences, PreferredTime, Priority,
    };

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn planner_at(now: &str) -> HeuristicPlanner {
        HeuristicPlanner::new(Arc::new(FixedClock(utc(now))))
    }

    fn task(id: &str, minutes: u32, priority: Priority) -> TaskSpec {
        TaskSpec {
            id: id.into(),
            title: id.to_uppercase(),
            estimated_duration_minutes: minutes,
            priority,
            deadline: None,
            preferred_time: None,
            dependencies: Vec::new(),
        }
    }

    fn request(tasks: Vec<TaskSpec>) -> PlanRequest {
        PlanRequest {
            tasks,
            existing_events: Vec::new(),
            preferences: Preferences::default(),
            constraints: Vec::new(),
            horizon_days: 7,
        }
    }

    fn fixed_event(id: &str, start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.into(),
            user_id: "u1".into(),
            title: id.to_uppercase(),
            start_time: utc(start),
            end_time: utc(end),
            is_all_day: false,
            source: EventSource::External,
            external_id: None,
            is_moveable: false,
            recurrence_rule: None,
            priority: None,
            description: None,
            timezone: None,
        }
    }

    #[test]
    fn zero_tasks_full_confidence_no_warnings() {
        let planner = planner_at("2024-01-15T08:00:00Z");
        let result = planner.plan_now(&request(Vec::new())).unwrap();
        assert!(result.scheduled_events.is_empty());
        assert_eq!(result.confidence, 1.0);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn priority_and_deadline_ordering_from_monday_morning() {
        // Monday 08:00: a 90-minute high task with a one-day deadline and a
        // 30-minute low task.
        let mut t1 = task("t1", 90, Priority::High);
        t1.deadline = Some(utc("2024-01-16T08:00:00Z"));
        let t2 = task("t2", 30, Priority::Low);

        let planner = planner_at("2024-01-15T08:00:00Z");
        let result = planner.plan_now(&request(vec![t1, t2])).unwrap();

        assert!(result.unscheduled_task_ids.is_empty());
        assert!(result.confidence > 0.9);

        let by_id: HashMap<&str, &ScheduledBlock> = result
            .scheduled_events
            .iter()
            .map(|b| (b.task_id.as_str(), b))
            .collect();
        // High-priority task lands in the first morning chunk.
        assert_eq!(by_id["t1"].start_time, utc("2024-01-15T09:00:00Z"));
        assert_eq!(by_id["t1"].end_time, utc("2024-01-15T10:30:00Z"));
        // The low task takes the next chunk after the 10:30 break.
        assert_eq!(by_id["t2"].start_time, utc("2024-01-15T10:45:00Z"));
        assert_eq!(by_id["t2"].end_time, utc("2024-01-15T11:15:00Z"));
    }

    #[test]
    fn plan_is_deterministic() {
        let mut t1 = task("t1", 90, Priority::High);
        t1.deadline = Some(utc("2024-01-16T08:00:00Z"));
        t1.preferred_time = Some(PreferredTime::Morning);
        let t2 = task("t2", 45, Priority::Medium);
        let req = request(vec![t1, t2]);

        let planner = planner_at("2024-01-15T08:00:00Z");
        let first = planner.plan_now(&req).unwrap();
        let second = planner.plan_now(&req).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn scheduled_blocks_never_overlap_each_other_or_fixed_events() {
        let events = vec![
            fixed_event("standup", "2024-01-15T09:00:00Z", "2024-01-15T09:30:00Z"),
            fixed_event("review", "2024-01-15T14:00:00Z", "2024-01-15T15:00:00Z"),
        ];
        let tasks = vec![
            task("a", 60, Priority::High),
            task("b", 60, Priority::Medium),
            task("c", 90, Priority::Low),
        ];
        let mut req = request(tasks);
        req.existing_events = events.clone();

        let planner = planner_at("2024-01-15T08:00:00Z");
        let result = planner.plan_now(&req).unwrap();

        for (i, a) in result.scheduled_events.iter().enumerate() {
            assert!(a.end_time > a.start_time);
            for b in result.scheduled_events.iter().skip(i + 1) {
                assert!(a.end_time <= b.start_time || b.end_time <= a.start_time);
            }
            for ev in &events {
                assert!(a.end_time <= ev.start_time || ev.end_time <= a.start_time);
            }
        }
    }

    #[test]
    fn oversized_task_is_unscheduled_with_named_warning() {
        // No single free chunk holds 9 hours.
        let big = task("big", 540, Priority::Medium);
        let planner = planner_at("2024-01-15T08:00:00Z");
        let mut req = request(vec![big]);
        req.horizon_days = 1;

        let result = planner.plan_now(&req).unwrap();
        assert_eq!(result.unscheduled_task_ids, vec!["big"]);
        assert!(result.warnings.iter().any(|w| w.contains("big")));
        assert!(result.confidence < 1.0);
    }

    #[test]
    fn hard_constraint_without_window_fails_the_plan() {
        let mut req = request(vec![task("a", 30, Priority::Medium)]);
        req.constraints.push(Constraint {
            kind: "focus".into(),
            start: None,
            end: None,
            description: "deep work only".into(),
            is_hard: true,
        });

        let planner = planner_at("2024-01-15T08:00:00Z");
        assert!(matches!(
            planner.plan_now(&req),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn hard_constraint_window_is_never_used() {
        let mut req = request(vec![task("a", 60, Priority::High)]);
        req.constraints.push(Constraint {
            kind: "blocked".into(),
            start: Some(utc("2024-01-15T09:00:00Z")),
            end: Some(utc("2024-01-15T12:00:00Z")),
            description: "offsite".into(),
            is_hard: true,
        });

        let planner = planner_at("2024-01-15T08:00:00Z");
        let result = planner.plan_now(&req).unwrap();
        let block = &result.scheduled_events[0];
        assert!(block.start_time >= utc("2024-01-15T12:00:00Z") || block.end_time <= utc("2024-01-15T09:00:00Z"));
    }

    #[test]
    fn soft_constraint_violation_lowers_confidence() {
        // Only one slot fits; it collides with a soft focus block.
        let mut req = request(vec![task("a", 60, Priority::Medium), task("b", 60, Priority::Low)]);
        req.constraints.push(Constraint {
            kind: "quiet".into(),
            start: Some(utc("2024-01-15T09:00:00Z")),
            end: Some(utc("2024-01-15T17:00:00Z")),
            description: "prefer no meetings Monday".into(),
            is_hard: false,
        });
        req.horizon_days = 0;

        let planner = planner_at("2024-01-15T08:00:00Z");
        let result = planner.plan_now(&req).unwrap();
        assert_eq!(result.scheduled_events.len(), 2);
        // Both placements violate the soft block: 0.3 + 0.6 - 0.1 = 0.8.
        assert!((result.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn dependencies_schedule_after_their_prerequisites() {
        let setup = task("setup", 60, Priority::Low);
        let mut finish = task("finish", 30, Priority::Urgent);
        finish.dependencies = vec!["setup".into()];

        let planner = planner_at("2024-01-15T08:00:00Z");
        let result = planner.plan_now(&request(vec![setup, finish])).unwrap();

        let by_id: HashMap<&str, &ScheduledBlock> = result
            .scheduled_events
            .iter()
            .map(|b| (b.task_id.as_str(), b))
            .collect();
        assert!(by_id["finish"].start_time >= by_id["setup"].end_time);
    }

    #[test]
    fn unknown_dependency_leaves_task_unscheduled() {
        let mut orphan = task("orphan", 30, Priority::Medium);
        orphan.dependencies = vec!["ghost".into()];

        let planner = planner_at("2024-01-15T08:00:00Z");
        let result = planner.plan_now(&request(vec![orphan])).unwrap();
        assert_eq!(result.unscheduled_task_ids, vec!["orphan"]);
        assert!(result.warnings.iter().any(|w| w.contains("ghost")));
    }

    #[test]
    fn circular_dependencies_are_reported() {
        let mut a = task("a", 30, Priority::Medium);
        a.dependencies = vec!["b".into()];
        let mut b = task("b", 30, Priority::Medium);
        b.dependencies = vec!["a".into()];

        let planner = planner_at("2024-01-15T08:00:00Z");
        let result = planner.plan_now(&request(vec![a, b])).unwrap();
        assert_eq!(result.scheduled_events.len(), 0);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("circular dependency")));
    }

    #[test]
    fn preferred_evening_task_avoids_morning_when_possible() {
        let mut evening = task("ev", 30, Priority::Medium);
        evening.preferred_time = Some(PreferredTime::Evening);
        let prefs = Preferences {
            work_end: chrono::NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            ..Default::default()
        };
        let mut req = request(vec![evening]);
        req.preferences = prefs;
        req.horizon_days = 0;

        let planner = planner_at("2024-01-15T08:00:00Z");
        let result = planner.plan_now(&req).unwrap();
        let local_hour = result.scheduled_events[0].start_time.hour();
        assert!(local_hour >= 16, "expected a late slot, got {local_hour}");
    }
}
