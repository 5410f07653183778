//! LLM-assisted planner.
//!
//! Asks the model for a full schedule in one shot, extracts the JSON object
//! from the response, validates every entry against the same contract the
//! heuristic planner honors, and falls back to the heuristic when the model
//! is unavailable or emits garbage.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use dl_domain::clock::Clock;
use dl_domain::config::PlannerConfig;
use dl_domain::error::Result;
use dl_domain::model::{PlanResult, Priority, ScheduledBlock};
use dl_domain::tool::Message;
use dl_providers::{CompletionRequest, LlmProvider};

use crate::heuristic::HeuristicPlanner;
use crate::{PlanRequest, Planner};

/// Confidence reported when the model output is unusable and the heuristic
/// stands in.
const FALLBACK_CONFIDENCE: f64 = 0.3;

const SYSTEM_PROMPT: &str = "\
You are an expert scheduling assistant. You allocate tasks to free time on a \
user's calendar while balancing productivity and well-being.

PRINCIPLES:
1. Respect the user's preferences and every listed constraint.
2. Never overlap existing events that cannot be moved.
3. Put high-priority tasks in high-energy periods, typically mornings.
4. Leave breathing room between tasks; respect deadlines.

OUTPUT FORMAT:
Respond with a single JSON object:
{
  \"scheduled_events\": [
    {
      \"task_id\": \"string\",
      \"title\": \"string\",
      \"start_time\": \"RFC 3339 UTC, e.g. 2024-01-15T09:00:00Z\",
      \"end_time\": \"RFC 3339 UTC\",
      \"priority\": \"low|medium|high|urgent\"
    }
  ],
  \"reasoning\": \"why the schedule looks this way\",
  \"confidence_score\": 0.85,
  \"warnings\": [\"...\"]
}
No prose outside the JSON object.";

pub struct LlmPlanner {
    provider: Arc<dyn LlmProvider>,
    fallback: HeuristicPlanner,
    clock: Arc<dyn Clock>,
    deadline: Duration,
}

impl LlmPlanner {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        clock: Arc<dyn Clock>,
        config: &PlannerConfig,
    ) -> Self {
        Self {
            provider,
            fallback: HeuristicPlanner::new(clock.clone()),
            clock,
            deadline: Duration::from_secs(config.llm_deadline_secs),
        }
    }

    fn fall_back(&self, req: &PlanRequest, warning: &str) -> Result<PlanResult> {
        tracing::warn!(warning, "LLM planner falling back to heuristic");
        let mut result = self.fallback.plan_now(req)?;
        result.warnings.push(warning.to_owned());
        result.confidence = FALLBACK_CONFIDENCE;
        Ok(result)
    }

    fn user_prompt(&self, req: &PlanRequest, now: DateTime<Utc>) -> String {
        format!(
            "SCHEDULING REQUEST\n\n\
             Current time: {now}\n\
             Planning horizon: {horizon} days\n\n\
             USER PREFERENCES:\n{prefs}\n\n\
             EXISTING EVENTS (cannot be moved unless marked moveable):\n{events}\n\n\
             TASKS TO SCHEDULE:\n{tasks}\n\n\
             CONSTRAINTS:\n{constraints}\n\n\
             Schedule the tasks within the horizon and respond with the JSON \
             object described in the system message.",
            now = now.to_rfc3339(),
            horizon = req.horizon_days,
            prefs = serde_json::to_string_pretty(&req.preferences).unwrap_or_default(),
            events = serde_json::to_string_pretty(&req.existing_events).unwrap_or_default(),
            tasks = serde_json::to_string_pretty(&req.tasks).unwrap_or_default(),
            constraints = serde_json::to_string_pretty(&req.constraints).unwrap_or_default(),
        )
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, req: &PlanRequest) -> Result<PlanResult> {
        req.preferences.validate()?;
        if req.tasks.is_empty() {
            return Ok(PlanResult::empty("No tasks to schedule."));
        }

        let now = self.clock.now();
        let completion = CompletionRequest {
            messages: vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(self.user_prompt(req, now)),
            ],
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
            model: None,
        };

        let response =
            match tokio::time::timeout(self.deadline, self.provider.complete(completion)).await {
                Ok(Ok(message)) => message,
                Ok(Err(e)) => {
                    return self.fall_back(req, &format!("LLM scheduling unavailable: {e}"))
                }
                Err(_) => return self.fall_back(req, "LLM scheduling timed out"),
            };

        let Some(raw_json) = extract_json(&response.content) else {
            return self.fall_back(req, "LLM parse failure");
        };
        let payload: LlmPlanPayload = match serde_json::from_str(raw_json) {
            Ok(payload) => payload,
            Err(_) => return self.fall_back(req, "LLM parse failure"),
        };

        Ok(validate_payload(payload, req))
    }
}

/// The substring from the first `{` to the last `}`, if any.
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

#[derive(Debug, Deserialize)]
struct LlmPlanPayload {
    #[serde(default)]
    scheduled_events: Vec<serde_json::Value>,
    #[serde(default)]
    reasoning: String,
    #[serde(default = "default_confidence")]
    confidence_score: f64,
    #[serde(default)]
    warnings: Vec<String>,
}

fn default_confidence() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
struct LlmBlock {
    task_id: String,
    title: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(default)]
    priority: Option<Priority>,
}

/// Keep only entries that honor the planning contract; everything dropped
/// lands in the warnings.
fn validate_payload(payload: LlmPlanPayload, req: &PlanRequest) -> PlanResult {
    let mut warnings = payload.warnings;
    let mut accepted: Vec<ScheduledBlock> = Vec::new();

    let fixed_spans: Vec<(DateTime<Utc>, DateTime<Utc>)> = req
        .existing_events
        .iter()
        .filter(|e| !e.is_moveable)
        .map(|e| e.effective_span())
        .collect();
    let hard_spans: Vec<(DateTime<Utc>, DateTime<Utc>)> = req
        .constraints
        .iter()
        .filter(|c| c.is_hard)
        .filter_map(|c| c.blocked_span())
        .collect();

    for value in payload.scheduled_events {
        let block: LlmBlock = match serde_json::from_value(value) {
            Ok(block) => block,
            Err(e) => {
                warnings.push(format!("discarded malformed scheduled entry: {e}"));
                continue;
            }
        };

        if block.end_time <= block.start_time {
            warnings.push(format!(
                "discarded '{}': end_time is not after start_time",
                block.task_id
            ));
            continue;
        }
        if !req.tasks.iter().any(|t| t.id == block.task_id) {
            warnings.push(format!(
                "discarded '{}': not among the requested tasks",
                block.task_id
            ));
            continue;
        }
        let overlaps = |spans: &[(DateTime<Utc>, DateTime<Utc>)]| {
            spans
                .iter()
                .any(|(start, end)| block.start_time < *end && block.end_time > *start)
        };
        if overlaps(&fixed_spans) {
            warnings.push(format!(
                "discarded '{}': overlaps a non-moveable event",
                block.task_id
            ));
            continue;
        }
        if overlaps(&hard_spans) {
            warnings.push(format!(
                "discarded '{}': overlaps a hard constraint window",
                block.task_id
            ));
            continue;
        }
        if accepted
            .iter()
            .any(|a| block.start_time < a.end_time && block.end_time > a.start_time)
        {
            warnings.push(format!(
                "discarded '{}': overlaps another scheduled entry",
                block.task_id
            ));
            continue;
        }

        accepted.push(ScheduledBlock {
            task_id: block.task_id,
            title: block.title,
            start_time: block.start_time,
            end_time: block.end_time,
            priority: block.priority,
        });
    }

    let unscheduled_task_ids: Vec<String> = req
        .tasks
        .iter()
        .filter(|t| !accepted.iter().any(|a| a.task_id == t.id))
        .map(|t| t.id.clone())
        .collect();

    PlanResult {
        scheduled_events: accepted,
        unscheduled_task_ids,
        warnings,
        reasoning: payload.reasoning,
        confidence: payload.confidence_score.clamp(0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dl_domain::clock::FixedClock;
    use dl_domain::error::Error;
    use dl_domain::model::{CalendarEvent, EventSource, Preferences, TaskSpec};
    use dl_domain::tool::AssistantMessage;
    use parking_lot::Mutex;

    struct ScriptedProvider {
        responses: Mutex<Vec<Result<AssistantMessage>>>,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn replying(content: &str) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(vec![Ok(AssistantMessage::text(content))]),
                delay: None,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(vec![Err(Error::upstream("llm", "boom"))]),
                delay: None,
            })
        }

        fn sleeping(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(vec![Ok(AssistantMessage::text("{}"))]),
                delay: Some(delay),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(&self, _req: CompletionRequest) -> Result<AssistantMessage> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .pop()
                .unwrap_or_else(|| Ok(AssistantMessage::text("{}")))
        }

        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn task(id: &str, minutes: u32) -> TaskSpec {
        TaskSpec {
            id: id.into(),
            title: id.to_uppercase(),
            estimated_duration_minutes: minutes,
            priority: dl_domain::model::Priority::Medium,
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

    fn planner(provider: Arc<dyn LlmProvider>) -> LlmPlanner {
        LlmPlanner::new(
            provider,
            Arc::new(FixedClock(utc("2024-01-15T08:00:00Z"))),
            &PlannerConfig::default(),
        )
    }

    #[tokio::test]
    async fn valid_model_output_is_accepted() {
        let provider = ScriptedProvider::replying(
            r#"Here is your plan:
            {"scheduled_events":[
                {"task_id":"t1","title":"T1","start_time":"2024-01-15T09:00:00Z","end_time":"2024-01-15T10:00:00Z","priority":"medium"}
            ],"reasoning":"morning focus","confidence_score":0.85,"warnings":[]}"#,
        );
        let result = planner(provider)
            .plan(&request(vec![task("t1", 60)]))
            .await
            .unwrap();

        assert_eq!(result.scheduled_events.len(), 1);
        assert_eq!(result.scheduled_events[0].task_id, "t1");
        assert!(result.unscheduled_task_ids.is_empty());
        assert!((result.confidence - 0.85).abs() < 1e-9);
        assert_eq!(result.reasoning, "morning focus");
    }

    #[tokio::test]
    async fn unparseable_output_falls_back_to_heuristic() {
        let provider = ScriptedProvider::replying("I cannot produce JSON today.");
        let result = planner(provider)
            .plan(&request(vec![task("t1", 60)]))
            .await
            .unwrap();

        assert!(result.warnings.iter().any(|w| w.contains("LLM parse failure")));
        assert!((result.confidence - FALLBACK_CONFIDENCE).abs() < 1e-9);
        // The heuristic still produced a real plan.
        assert_eq!(result.scheduled_events.len(), 1);
    }

    #[tokio::test]
    async fn provider_error_falls_back_to_heuristic() {
        let provider = ScriptedProvider::failing();
        let result = planner(provider)
            .plan(&request(vec![task("t1", 60)]))
            .await
            .unwrap();
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("LLM scheduling unavailable")));
        assert!((result.confidence - FALLBACK_CONFIDENCE).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_hits_the_deadline() {
        let provider = ScriptedProvider::sleeping(Duration::from_secs(120));
        let result = planner(provider)
            .plan(&request(vec![task("t1", 60)]))
            .await
            .unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("timed out")));
        assert!((result.confidence - FALLBACK_CONFIDENCE).abs() < 1e-9);
    }

    #[tokio::test]
    async fn invalid_entries_are_dropped_with_warnings() {
        let mut req = request(vec![task("t1", 60), task("t2", 30)]);
        req.existing_events.push(CalendarEvent {
            id: "fixed".into(),
            user_id: "u1".into(),
            title: "Offsite".into(),
            start_time: utc("2024-01-15T11:00:00Z"),
            end_time: utc("2024-01-15T12:00:00Z"),
            is_all_day: false,
            source: EventSource::External,
            external_id: None,
            is_moveable: false,
            recurrence_rule: None,
            priority: None,
            description: None,
            timezone: None,
        });

        let provider = ScriptedProvider::replying(
            r#"{"scheduled_events":[
                {"task_id":"t1","title":"T1","start_time":"2024-01-15T11:30:00Z","end_time":"2024-01-15T12:30:00Z"},
                {"task_id":"ghost","title":"??","start_time":"2024-01-15T09:00:00Z","end_time":"2024-01-15T10:00:00Z"},
                {"task_id":"t2","title":"T2","start_time":"2024-01-15T09:00:00Z","end_time":"2024-01-15T09:30:00Z"}
            ],"reasoning":"r","confidence_score":0.9}"#,
        );
        let result = planner(provider).plan(&req).await.unwrap();

        // t1 overlapped the fixed event, ghost is unknown; only t2 survives.
        assert_eq!(result.scheduled_events.len(), 1);
        assert_eq!(result.scheduled_events[0].task_id, "t2");
        assert_eq!(result.unscheduled_task_ids, vec!["t1"]);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("non-moveable")));
        assert!(result.warnings.iter().any(|w| w.contains("ghost")));
    }

    #[tokio::test]
    async fn overlapping_model_entries_keep_first_only() {
        let provider = ScriptedProvider::replying(
            r#"{"scheduled_events":[
                {"task_id":"t1","title":"T1","start_time":"2024-01-15T09:00:00Z","end_time":"2024-01-15T10:00:00Z"},
                {"task_id":"t2","title":"T2","start_time":"2024-01-15T09:30:00Z","end_time":"2024-01-15T10:30:00Z"}
            ],"reasoning":"r","confidence_score":0.7}"#,
        );
        let result = planner(provider)
            .plan(&request(vec![task("t1", 60), task("t2", 60)]))
            .await
            .unwrap();

        assert_eq!(result.scheduled_events.len(), 1);
        assert_eq!(result.unscheduled_task_ids, vec!["t2"]);
    }

    #[tokio::test]
    async fn empty_task_list_short_circuits() {
        let provider = ScriptedProvider::failing(); // must never be called
        let result = planner(provider).plan(&request(Vec::new())).await.unwrap();
        assert!(result.scheduled_events.is_empty());
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn extract_json_finds_outermost_object() {
        assert_eq!(extract_json("prefix {\"a\":1} suffix"), Some("{\"a\":1}"));
        assert_eq!(extract_json("no braces"), None);
        assert_eq!(extract_json("} reversed {"), None);
    }
}
