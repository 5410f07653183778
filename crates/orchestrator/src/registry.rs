//! Tool registry — declares the tool surface exposed to the LLM and
//! dispatches tool calls to their handlers.
//!
//! Every tool predeclares a strict JSON schema next to its handler; the
//! registry refuses to start if any tool lacks one. Dispatch is pure with
//! respect to the caller: handlers receive the verified identity through
//! [`ToolCtx`] and never read ambient state. Failures become structured
//! [`ToolError`] payloads, never aborted turns.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use dl_conflicts::{
    auto_resolve, detect_conflicts, resolve_conflict, AutoResolveRules, ResolutionStrategy,
    UserDecision,
};
use dl_domain::clock::Clock;
use dl_domain::error::{Error, Result};
use dl_domain::model::{
    Brick, BrickCategory, BrickPatch, CalendarEvent, Constraint, EventSource, LifecycleStatus,
    NewBrick, NewQuanta, Preferences, Priority, Quanta, QuantaPatch, TaskSpec,
};
use dl_domain::tool::{ToolCall, ToolDefinition, ToolError, ToolErrorKind};
use dl_planner::{PlanRequest, Planner};
use dl_providers::{CalendarProvider, ResourceRecommender, UserCtx};
use dl_repository::{BrickFilter, BrickRepository, QuantaFilter, QuantaRepository};

use crate::schema::validate_args;

const DEFAULT_CALENDAR: &str = "primary";
const DEFAULT_HORIZON_DAYS: u32 = 7;
const DEFAULT_EVENT_FETCH: usize = 250;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Verified caller identity, supplied by the orchestrator per turn. The
/// model is never trusted with it.
#[derive(Debug, Clone)]
pub struct ToolCtx {
    pub user_id: String,
}

/// Durable effect of a successful tool call, used to derive causal metadata
/// without scraping result strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolEffect {
    BrickCreated(String),
    BrickUpdated(String),
    ScheduleUpdated,
    ResourcesRecommended(Vec<String>),
}

/// What a dispatched tool call produced.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Payload appended as the tool message content.
    pub content: String,
    pub is_error: bool,
    pub effect: Option<ToolEffect>,
}

impl ToolOutcome {
    fn ok(value: &impl Serialize) -> Self {
        Self {
            content: serde_json::to_string_pretty(value).unwrap_or_default(),
            is_error: false,
            effect: None,
        }
    }

    fn with_effect(mut self, effect: ToolEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    fn error(err: ToolError) -> Self {
        Self {
            content: err.to_payload(),
            is_error: true,
            effect: None,
        }
    }
}

/// Collaborators the tool handlers work through.
pub struct ToolDeps {
    pub bricks: Arc<dyn BrickRepository>,
    pub quantas: Arc<dyn QuantaRepository>,
    pub calendar: Arc<dyn CalendarProvider>,
    pub planner: Arc<dyn Planner>,
    pub resources: Option<Arc<dyn ResourceRecommender>>,
    /// Used when a tool call omits preferences or a date range.
    pub default_preferences: Preferences,
    pub clock: Arc<dyn Clock>,
}

struct ToolSpec {
    definition: ToolDefinition,
    identity_bound: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolRegistry {
    deps: ToolDeps,
    specs: Vec<ToolSpec>,
}

impl ToolRegistry {
    /// Build the registry, failing fast if any tool schema is malformed.
    pub fn new(deps: ToolDeps) -> Result<Self> {
        let specs = build_specs();
        for spec in &specs {
            let params = &spec.definition.parameters;
            if params.get("type").and_then(Value::as_str) != Some("object")
                || !params.get("properties").is_some_and(Value::is_object)
            {
                return Err(Error::Internal(format!(
                    "tool '{}' has no object parameter schema",
                    spec.definition.name
                )));
            }
        }
        Ok(Self { deps, specs })
    }

    /// Tool definitions to pass to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.specs.iter().map(|s| s.definition.clone()).collect()
    }

    pub fn is_identity_bound(&self, tool_name: &str) -> bool {
        self.specs
            .iter()
            .any(|s| s.definition.name == tool_name && s.identity_bound)
    }

    /// Dispatch one tool call. Arguments are expected to be structured JSON
    /// (the turn loop parses any serialized string form exactly once before
    /// calling this).
    pub async fn dispatch(&self, ctx: &ToolCtx, call: &ToolCall) -> ToolOutcome {
        let Some(spec) = self
            .specs
            .iter()
            .find(|s| s.definition.name == call.tool_name)
        else {
            return ToolOutcome::error(
                ToolError::new(
                    ToolErrorKind::NotFound,
                    format!("unknown tool '{}'", call.tool_name),
                )
                .with_hint("use one of the declared tools"),
            );
        };

        let mut args = match &call.arguments {
            Value::Null => Value::Object(Default::default()),
            value => value.clone(),
        };
        if !args.is_object() {
            return ToolOutcome::error(
                ToolError::new(
                    ToolErrorKind::Validation,
                    "tool arguments must be a JSON object",
                )
                .with_hint("pass arguments as an object matching the tool schema"),
            );
        }

        normalize_enum_strings(&mut args);

        // Identity injection: the caller's id always wins over anything the
        // model put in the arguments.
        if spec.identity_bound {
            args["user_id"] = Value::String(ctx.user_id.clone());
        }

        if let Err(message) = validate_args(&spec.definition.parameters, &args) {
            return ToolOutcome::error(
                ToolError::new(ToolErrorKind::Validation, message)
                    .with_hint(format!("check the '{}' schema and retry", call.tool_name)),
            );
        }

        match self.invoke(ctx, &spec.definition.name, &args).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!(tool = %call.tool_name, error = %e, "tool call failed");
                ToolOutcome::error(ToolError::from(&e))
            }
        }
    }

    async fn invoke(&self, ctx: &ToolCtx, name: &str, args: &Value) -> Result<ToolOutcome> {
        match name {
            "create_brick" => self.create_brick(ctx, args).await,
            "update_brick" => self.update_brick(ctx, args).await,
            "delete_brick" => self.delete_brick(ctx, args).await,
            "list_bricks" => self.list_bricks(ctx, args).await,
            "create_quanta" => self.create_quanta(ctx, args).await,
            "update_quanta" => self.update_quanta(ctx, args).await,
            "delete_quanta" => self.delete_quanta(ctx, args).await,
            "list_quantas" => self.list_quantas(ctx, args).await,
            "get_schedule" => self.get_schedule(ctx, args).await,
            "generate_schedule" => self.generate_schedule(ctx, args).await,
            "optimize_schedule" => self.optimize_schedule(ctx, args).await,
            "list_calendar_events" => self.list_calendar_events(ctx, args).await,
            "sync_calendar" => self.sync_calendar(ctx, args).await,
            "get_calendar_conflicts" => self.get_calendar_conflicts(ctx, args).await,
            "apply_conflict_resolution" => self.apply_conflict_resolution(ctx, args).await,
            "list_resources" => self.list_resources(ctx, args).await,
            "search_resources" => self.search_resources(ctx, args).await,
            _ => Err(Error::Internal(format!("unrouted tool '{name}'"))),
        }
    }

    // ── Brick tools ────────────────────────────────────────────────

    async fn create_brick(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        let new: NewBrickArgs = parse_args(args)?;
        let brick = self.deps.bricks.create_brick(&ctx.user_id, new.into()).await?;
        tracing::info!(user_id = %ctx.user_id, brick_id = %brick.id, "brick created via tool");
        Ok(ToolOutcome::ok(&json!({
            "brick_id": brick.id,
            "title": brick.title,
            "status": brick.status,
        }))
        .with_effect(ToolEffect::BrickCreated(brick.id)))
    }

    async fn update_brick(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Args {
            brick_id: String,
            #[serde(flatten)]
            patch: BrickPatch,
        }
        let args: Args = parse_args(args)?;
        let brick = self
            .deps
            .bricks
            .update_brick(&ctx.user_id, &args.brick_id, args.patch)
            .await?;
        Ok(ToolOutcome::ok(&json!({
            "brick_id": brick.id,
            "updated": true,
        }))
        .with_effect(ToolEffect::BrickUpdated(brick.id)))
    }

    async fn delete_brick(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Args {
            brick_id: String,
            #[serde(default)]
            delete_quantas: bool,
        }
        let args: Args = parse_args(args)?;
        self.deps
            .bricks
            .delete_brick(&ctx.user_id, &args.brick_id, args.delete_quantas)
            .await?;
        Ok(ToolOutcome::ok(&json!({
            "brick_id": args.brick_id,
            "deleted": true,
            "quantas_deleted": args.delete_quantas,
        })))
    }

    async fn list_bricks(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            status: Option<LifecycleStatus>,
            #[serde(default)]
            category: Option<BrickCategory>,
        }
        let args: Args = parse_args(args)?;
        let filter = BrickFilter {
            status: args.status,
            category: args.category,
        };
        let bricks = self.deps.bricks.list_bricks(&ctx.user_id, &filter).await?;
        let summaries: Vec<Value> = bricks.iter().map(brick_summary).collect();
        Ok(ToolOutcome::ok(&json!({
            "bricks": summaries,
            "count": summaries.len(),
        })))
    }

    // ── Quanta tools ───────────────────────────────────────────────

    async fn create_quanta(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        let new: NewQuantaArgs = parse_args(args)?;
        let quanta = self
            .deps
            .quantas
            .create_quanta(&ctx.user_id, new.into())
            .await?;
        Ok(ToolOutcome::ok(&json!({
            "quanta_id": quanta.id,
            "brick_id": quanta.brick_id,
            "title": quanta.title,
        })))
    }

    async fn update_quanta(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Args {
            quanta_id: String,
            #[serde(flatten)]
            patch: QuantaPatch,
        }
        let args: Args = parse_args(args)?;
        let quanta = self
            .deps
            .quantas
            .update_quanta(&ctx.user_id, &args.quanta_id, args.patch)
            .await?;
        Ok(ToolOutcome::ok(&json!({
            "quanta_id": quanta.id,
            "updated": true,
        })))
    }

    async fn delete_quanta(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Args {
            quanta_id: String,
        }
        let args: Args = parse_args(args)?;
        self.deps
            .quantas
            .delete_quanta(&ctx.user_id, &args.quanta_id)
            .await?;
        Ok(ToolOutcome::ok(&json!({
            "quanta_id": args.quanta_id,
            "deleted": true,
        })))
    }

    async fn list_quantas(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            brick_id: Option<String>,
            #[serde(default)]
            status: Option<LifecycleStatus>,
        }
        let args: Args = parse_args(args)?;
        let filter = QuantaFilter {
            brick_id: args.brick_id,
            status: args.status,
        };
        let quantas = self.deps.quantas.list_quantas(&ctx.user_id, &filter).await?;
        let summaries: Vec<Value> = quantas.iter().map(quanta_summary).collect();
        Ok(ToolOutcome::ok(&json!({
            "quantas": summaries,
            "count": summaries.len(),
        })))
    }

    // ── Schedule tools ─────────────────────────────────────────────

    async fn get_schedule(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            start_date: Option<DateTime<Utc>>,
            #[serde(default)]
            end_date: Option<DateTime<Utc>>,
        }
        let args: Args = parse_args(args)?;
        let range = self.range_or_default(args.start_date, args.end_date);
        let events = self
            .deps
            .calendar
            .list_events(
                &UserCtx::new(&ctx.user_id),
                DEFAULT_CALENDAR,
                range,
                DEFAULT_EVENT_FETCH,
            )
            .await?;
        Ok(ToolOutcome::ok(&json!({
            "range": { "start": range.0, "end": range.1 },
            "events": events,
            "count": events.len(),
        })))
    }

    async fn generate_schedule(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Args {
            tasks: Vec<TaskSpec>,
            #[serde(default)]
            existing_events: Vec<EventInput>,
            #[serde(default)]
            preferences: Option<Preferences>,
            #[serde(default)]
            constraints: Vec<Constraint>,
            #[serde(default)]
            horizon_days: Option<u32>,
        }
        let args: Args = parse_args(args)?;
        let request = PlanRequest {
            tasks: args.tasks,
            existing_events: materialize_events(args.existing_events, &ctx.user_id),
            preferences: args
                .preferences
                .unwrap_or_else(|| self.deps.default_preferences.clone()),
            constraints: args.constraints,
            horizon_days: args.horizon_days.unwrap_or(DEFAULT_HORIZON_DAYS),
        };
        let plan = self.deps.planner.plan(&request).await?;
        tracing::info!(
            user_id = %ctx.user_id,
            scheduled = plan.scheduled_events.len(),
            unscheduled = plan.unscheduled_task_ids.len(),
            "schedule generated"
        );
        Ok(ToolOutcome::ok(&plan).with_effect(ToolEffect::ScheduleUpdated))
    }

    async fn optimize_schedule(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Args {
            existing_schedule: Vec<EventInput>,
            #[serde(default)]
            goals: Vec<String>,
            #[serde(default)]
            preferences: Option<Preferences>,
            #[serde(default)]
            horizon_days: Option<u32>,
        }
        let args: Args = parse_args(args)?;
        let events = materialize_events(args.existing_schedule, &ctx.user_id);

        // Moveable entries are re-planned as tasks; the rest stay fixed.
        let (moveable, fixed): (Vec<CalendarEvent>, Vec<CalendarEvent>) =
            events.into_iter().partition(|e| e.is_moveable);
        let tasks: Vec<TaskSpec> = moveable
            .iter()
            .map(|e| TaskSpec {
                id: e.id.clone(),
                title: e.title.clone(),
                estimated_duration_minutes: (e.end_time - e.start_time).num_minutes().max(1) as u32,
                priority: e.priority.unwrap_or(Priority::Medium),
                deadline: None,
                preferred_time: None,
                dependencies: Vec::new(),
            })
            .collect();

        let request = PlanRequest {
            tasks,
            existing_events: fixed,
            preferences: args
                .preferences
                .unwrap_or_else(|| self.deps.default_preferences.clone()),
            constraints: Vec::new(),
            horizon_days: args.horizon_days.unwrap_or(DEFAULT_HORIZON_DAYS),
        };
        let mut plan = self.deps.planner.plan(&request).await?;
        if !args.goals.is_empty() {
            plan.reasoning = format!("{} Goals considered: {}.", plan.reasoning, args.goals.join("; "));
        }
        Ok(ToolOutcome::ok(&plan).with_effect(ToolEffect::ScheduleUpdated))
    }

    // ── Calendar tools ─────────────────────────────────────────────

    async fn list_calendar_events(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        let args: CalendarRangeArgs = parse_args(args)?;
        let range = self.range_or_default(args.start, args.end);
        let events = self
            .deps
            .calendar
            .list_events(
                &UserCtx::new(&ctx.user_id),
                args.calendar_id.as_deref().unwrap_or(DEFAULT_CALENDAR),
                range,
                args.max.unwrap_or(DEFAULT_EVENT_FETCH),
            )
            .await?;
        Ok(ToolOutcome::ok(&json!({
            "events": events,
            "count": events.len(),
        })))
    }

    async fn sync_calendar(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            calendar_id: Option<String>,
            #[serde(default)]
            start: Option<DateTime<Utc>>,
            #[serde(default)]
            end: Option<DateTime<Utc>>,
            #[serde(default)]
            conflict_strategy: Option<ResolutionStrategy>,
        }
        let args: Args = parse_args(args)?;
        let range = self.range_or_default(args.start, args.end);
        let events = self
            .deps
            .calendar
            .list_events(
                &UserCtx::new(&ctx.user_id),
                args.calendar_id.as_deref().unwrap_or(DEFAULT_CALENDAR),
                range,
                DEFAULT_EVENT_FETCH,
            )
            .await?;

        let detection = detect_conflicts(&events, Some(range));
        let resolutions = match args.conflict_strategy {
            // An explicit strategy is applied wherever the conflict allows it.
            Some(strategy) => detection
                .conflicts
                .iter()
                .filter_map(|c| {
                    resolve_conflict(&detection.conflicts, &c.id, strategy, None).ok()
                })
                .collect(),
            None => auto_resolve(&detection.conflicts, &AutoResolveRules::default()),
        };

        let summary = json!({
            "events_fetched": events.len(),
            "conflicts_detected": detection.conflicts.len(),
            "resolutions_applied": resolutions.len(),
            "unresolved_conflicts": detection.conflicts.len() - resolutions.len(),
            "skipped_event_ids": detection.skipped_event_ids,
            "resolutions": resolutions,
        });
        tracing::info!(
            user_id = %ctx.user_id,
            conflicts = detection.conflicts.len(),
            resolved = resolutions.len(),
            "calendar sync completed"
        );
        Ok(ToolOutcome::ok(&summary))
    }

    async fn get_calendar_conflicts(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        let args: CalendarRangeArgs = parse_args(args)?;
        let range = self.range_or_default(args.start, args.end);
        let events = self
            .deps
            .calendar
            .list_events(
                &UserCtx::new(&ctx.user_id),
                args.calendar_id.as_deref().unwrap_or(DEFAULT_CALENDAR),
                range,
                DEFAULT_EVENT_FETCH,
            )
            .await?;
        let detection = detect_conflicts(&events, Some(range));
        Ok(ToolOutcome::ok(&json!({
            "conflicts": detection.conflicts,
            "count": detection.conflicts.len(),
            "skipped_event_ids": detection.skipped_event_ids,
        })))
    }

    async fn apply_conflict_resolution(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Entry {
            conflict_id: String,
            strategy: ResolutionStrategy,
            #[serde(default)]
            user_decision: Option<UserDecision>,
        }
        #[derive(Deserialize)]
        struct Args {
            resolutions: Vec<Entry>,
            #[serde(default)]
            calendar_id: Option<String>,
            #[serde(default)]
            start: Option<DateTime<Utc>>,
            #[serde(default)]
            end: Option<DateTime<Utc>>,
        }
        let args: Args = parse_args(args)?;
        let range = self.range_or_default(args.start, args.end);
        let events = self
            .deps
            .calendar
            .list_events(
                &UserCtx::new(&ctx.user_id),
                args.calendar_id.as_deref().unwrap_or(DEFAULT_CALENDAR),
                range,
                DEFAULT_EVENT_FETCH,
            )
            .await?;
        // Conflict ids are deterministic, so re-detection rebinds the ids the
        // caller saw earlier to the same conflicts.
        let detection = detect_conflicts(&events, Some(range));

        let mut applied = Vec::new();
        let mut failures = Vec::new();
        for entry in args.resolutions {
            match resolve_conflict(
                &detection.conflicts,
                &entry.conflict_id,
                entry.strategy,
                entry.user_decision.as_ref(),
            ) {
                Ok(resolution) => applied.push(resolution),
                Err(e) => failures.push(json!({
                    "conflict_id": entry.conflict_id,
                    "error": e.to_string(),
                })),
            }
        }

        Ok(ToolOutcome::ok(&json!({
            "applied": applied,
            "failed": failures,
        })))
    }

    // ── Resource tools ─────────────────────────────────────────────

    async fn list_resources(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            category: Option<String>,
        }
        let Some(recommender) = &self.deps.resources else {
            return Ok(recommender_unavailable());
        };
        let args: Args = parse_args(args)?;
        let resources = recommender
            .list(&ctx.user_id, args.category.as_deref())
            .await?;
        let ids = resources.iter().map(|r| r.id.clone()).collect();
        Ok(ToolOutcome::ok(&json!({ "resources": resources }))
            .with_effect(ToolEffect::ResourcesRecommended(ids)))
    }

    async fn search_resources(&self, ctx: &ToolCtx, args: &Value) -> Result<ToolOutcome> {
        #[derive(Deserialize)]
        struct Args {
            query: String,
            #[serde(default)]
            limit: Option<usize>,
        }
        let Some(recommender) = &self.deps.resources else {
            return Ok(recommender_unavailable());
        };
        let args: Args = parse_args(args)?;
        let resources = recommender
            .search(&ctx.user_id, &args.query, args.limit.unwrap_or(10))
            .await?;
        let ids = resources.iter().map(|r| r.id.clone()).collect();
        Ok(ToolOutcome::ok(&json!({ "resources": resources }))
            .with_effect(ToolEffect::ResourcesRecommended(ids)))
    }

    // ── Helpers ────────────────────────────────────────────────────

    /// Default window: today's local midnight through one week out.
    fn range_or_default(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let tz = self.deps.default_preferences.timezone;
        let today = self.deps.clock.now().with_timezone(&tz).date_naive();
        let midnight = tz
            .from_local_datetime(&today.and_time(chrono::NaiveTime::MIN))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| self.deps.clock.now());
        let start = start.unwrap_or(midnight);
        let end = end.unwrap_or(start + Duration::days(i64::from(DEFAULT_HORIZON_DAYS)));
        (start, end)
    }
}

fn recommender_unavailable() -> ToolOutcome {
    ToolOutcome::error(
        ToolError::new(
            ToolErrorKind::Upstream,
            "resource recommender is not configured",
        )
        .with_hint("resource recommendations are unavailable in this deployment"),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Argument shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_args<T: DeserializeOwned>(args: &Value) -> Result<T> {
    serde_json::from_value(args.clone())
        .map_err(|e| Error::Validation(format!("invalid arguments: {e}")))
}

#[derive(Deserialize)]
struct NewBrickArgs {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "d_category")]
    category: BrickCategory,
    #[serde(default = "d_priority")]
    priority: Priority,
    #[serde(default = "d_brick_duration")]
    estimated_duration_minutes: u32,
    #[serde(default)]
    target_date: Option<DateTime<Utc>>,
    #[serde(default)]
    deadline: Option<DateTime<Utc>>,
}

impl From<NewBrickArgs> for NewBrick {
    fn from(args: NewBrickArgs) -> Self {
        NewBrick {
            title: args.title,
            description: args.description,
            category: args.category,
            priority: args.priority,
            estimated_duration_minutes: args.estimated_duration_minutes,
            target_date: args.target_date,
            deadline: args.deadline,
        }
    }
}

#[derive(Deserialize)]
struct NewQuantaArgs {
    brick_id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "d_quanta_duration")]
    estimated_duration_minutes: u32,
    #[serde(default)]
    order_index: u32,
}

impl From<NewQuantaArgs> for NewQuanta {
    fn from(args: NewQuantaArgs) -> Self {
        NewQuanta {
            brick_id: args.brick_id,
            title: args.title,
            description: args.description,
            estimated_duration_minutes: args.estimated_duration_minutes,
            order_index: args.order_index,
        }
    }
}

fn d_category() -> BrickCategory {
    BrickCategory::Personal
}
fn d_priority() -> Priority {
    Priority::Medium
}
fn d_brick_duration() -> u32 {
    60
}
fn d_quanta_duration() -> u32 {
    30
}

#[derive(Deserialize)]
struct CalendarRangeArgs {
    #[serde(default)]
    calendar_id: Option<String>,
    #[serde(default)]
    start: Option<DateTime<Utc>>,
    #[serde(default)]
    end: Option<DateTime<Utc>>,
    #[serde(default)]
    max: Option<usize>,
}

/// Lenient event record accepted from the model; missing ids are
/// synthesized positionally so results stay deterministic.
#[derive(Deserialize)]
struct EventInput {
    #[serde(default)]
    id: Option<String>,
    title: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    #[serde(default)]
    is_all_day: bool,
    #[serde(default)]
    is_moveable: bool,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    recurrence_rule: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

fn materialize_events(inputs: Vec<EventInput>, user_id: &str) -> Vec<CalendarEvent> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(idx, input)| CalendarEvent {
            id: input.id.unwrap_or_else(|| format!("event-{}", idx + 1)),
            user_id: user_id.to_owned(),
            title: input.title,
            start_time: input.start_time,
            end_time: input.end_time,
            is_all_day: input.is_all_day,
            source: EventSource::External,
            external_id: None,
            is_moveable: input.is_moveable,
            recurrence_rule: input.recurrence_rule,
            priority: input.priority,
            description: input.description,
            timezone: None,
        })
        .collect()
}

fn brick_summary(brick: &Brick) -> Value {
    json!({
        "id": brick.id,
        "title": brick.title,
        "category": brick.category,
        "priority": brick.priority,
        "status": brick.status,
        "estimated_duration_minutes": brick.estimated_duration_minutes,
        "target_date": brick.target_date,
        "deadline": brick.deadline,
    })
}

fn quanta_summary(quanta: &Quanta) -> Value {
    json!({
        "id": quanta.id,
        "brick_id": quanta.brick_id,
        "title": quanta.title,
        "status": quanta.status,
        "estimated_duration_minutes": quanta.estimated_duration_minutes,
        "order_index": quanta.order_index,
    })
}

/// Lowercase the string values of enum-like keys anywhere in the argument
/// tree, so `"Priority": "High"` from the model matches the canonical
/// lowercase enumerations.
fn normalize_enum_strings(value: &mut Value) {
    const ENUM_KEYS: [&str; 6] = [
        "category",
        "priority",
        "status",
        "preferred_time",
        "conflict_strategy",
        "strategy",
    ];
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if ENUM_KEYS.contains(&key.as_str()) {
                    if let Value::String(s) = entry {
                        *entry = Value::String(s.trim().to_lowercase());
                    }
                } else {
                    normalize_enum_strings(entry);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                normalize_enum_strings(item);
            }
        }
        _ => {}
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn build_specs() -> Vec<ToolSpec> {
    let mut specs = Vec::new();

    let mut push = |name: &str, description: &str, identity_bound: bool, parameters: Value| {
        specs.push(ToolSpec {
            definition: ToolDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            identity_bound,
        });
    };

    push(
        "create_brick",
        "Create a new Brick (a durable goal). Caller identity is handled automatically; never supply a user id.",
        true,
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Title, 1-200 characters" },
                "description": { "type": "string", "description": "Optional longer description" },
                "category": {
                    "type": "string",
                    "enum": ["work", "personal", "health", "learning", "social", "maintenance", "recreation"],
                    "description": "Category of the Brick"
                },
                "priority": {
                    "type": "string",
                    "enum": ["low", "medium", "high", "urgent"],
                    "description": "Priority level"
                },
                "estimated_duration_minutes": { "type": "integer", "description": "Estimated total effort in minutes" },
                "target_date": { "type": "string", "description": "Target completion instant, RFC 3339" },
                "deadline": { "type": "string", "description": "Hard deadline, RFC 3339; must not precede target_date" }
            },
            "required": ["title"]
        }),
    );

    push(
        "update_brick",
        "Update an existing Brick's title, description, status, or priority.",
        true,
        json!({
            "type": "object",
            "properties": {
                "brick_id": { "type": "string", "description": "Id of the Brick to update" },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "status": {
                    "type": "string",
                    "enum": ["not_started", "in_progress", "completed", "cancelled", "postponed"]
                },
                "priority": { "type": "string", "enum": ["low", "medium", "high", "urgent"] }
            },
            "required": ["brick_id"]
        }),
    );

    push(
        "delete_brick",
        "Delete a Brick. Set delete_quantas to also remove its Quantas.",
        true,
        json!({
            "type": "object",
            "properties": {
                "brick_id": { "type": "string" },
                "delete_quantas": { "type": "boolean", "description": "Cascade to the Brick's Quantas" }
            },
            "required": ["brick_id"]
        }),
    );

    push(
        "list_bricks",
        "List the caller's Bricks, optionally filtered by status or category.",
        true,
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["not_started", "in_progress", "completed", "cancelled", "postponed"]
                },
                "category": {
                    "type": "string",
                    "enum": ["work", "personal", "health", "learning", "social", "maintenance", "recreation"]
                }
            }
        }),
    );

    push(
        "create_quanta",
        "Create a Quanta (sub-task) under an existing Brick.",
        true,
        json!({
            "type": "object",
            "properties": {
                "brick_id": { "type": "string", "description": "Parent Brick id" },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "estimated_duration_minutes": { "type": "integer", "description": "1-1440" },
                "order_index": { "type": "integer", "description": "Position within the Brick" }
            },
            "required": ["brick_id", "title"]
        }),
    );

    push(
        "update_quanta",
        "Update an existing Quanta.",
        true,
        json!({
            "type": "object",
            "properties": {
                "quanta_id": { "type": "string" },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "status": {
                    "type": "string",
                    "enum": ["not_started", "in_progress", "completed", "cancelled", "postponed"]
                },
                "estimated_duration_minutes": { "type": "integer" },
                "order_index": { "type": "integer" }
            },
            "required": ["quanta_id"]
        }),
    );

    push(
        "delete_quanta",
        "Delete a Quanta.",
        true,
        json!({
            "type": "object",
            "properties": {
                "quanta_id": { "type": "string" }
            },
            "required": ["quanta_id"]
        }),
    );

    push(
        "list_quantas",
        "List Quantas, optionally scoped to one Brick or filtered by status.",
        true,
        json!({
            "type": "object",
            "properties": {
                "brick_id": { "type": "string" },
                "status": {
                    "type": "string",
                    "enum": ["not_started", "in_progress", "completed", "cancelled", "postponed"]
                }
            }
        }),
    );

    push(
        "get_schedule",
        "Read the caller's schedule for a date range (defaults to the coming week). Read-only.",
        true,
        json!({
            "type": "object",
            "properties": {
                "start_date": { "type": "string", "description": "RFC 3339 start of range" },
                "end_date": { "type": "string", "description": "RFC 3339 end of range" }
            }
        }),
    );

    push(
        "generate_schedule",
        "Produce an optimized schedule placing the given tasks around existing events, preferences, and constraints.",
        true,
        json!({
            "type": "object",
            "properties": {
                "tasks": {
                    "type": "array",
                    "description": "Tasks to place; each needs id, title, estimated_duration_minutes, priority"
                },
                "existing_events": { "type": "array", "description": "Events already on the calendar" },
                "preferences": { "type": "object", "description": "Scheduling preferences; defaults to the caller's profile" },
                "constraints": { "type": "array", "description": "Hard and soft constraints" },
                "horizon_days": { "type": "integer", "description": "Planning horizon in days, default 7" }
            },
            "required": ["tasks"]
        }),
    );

    push(
        "optimize_schedule",
        "Re-plan the moveable parts of an existing schedule toward the given goals.",
        true,
        json!({
            "type": "object",
            "properties": {
                "existing_schedule": { "type": "array", "description": "Current schedule entries" },
                "goals": { "type": "array", "description": "Optimization goals in plain language" },
                "preferences": { "type": "object" },
                "horizon_days": { "type": "integer" }
            },
            "required": ["existing_schedule"]
        }),
    );

    push(
        "list_calendar_events",
        "List events from a calendar within a time range.",
        true,
        json!({
            "type": "object",
            "properties": {
                "calendar_id": { "type": "string", "description": "Calendar id, default 'primary'" },
                "start": { "type": "string", "description": "RFC 3339 start of range" },
                "end": { "type": "string", "description": "RFC 3339 end of range" },
                "max": { "type": "integer", "description": "Maximum events to return" }
            }
        }),
    );

    push(
        "sync_calendar",
        "Fetch calendar events, detect conflicts among them, and auto-resolve what the rules allow. Returns a sync summary.",
        true,
        json!({
            "type": "object",
            "properties": {
                "calendar_id": { "type": "string", "description": "Calendar id, default 'primary'" },
                "start": { "type": "string", "description": "RFC 3339 start of range" },
                "end": { "type": "string", "description": "RFC 3339 end of range" },
                "conflict_strategy": {
                    "type": "string",
                    "enum": ["keep_existing", "replace_with_new", "merge_events", "move_to_alternative_time", "split_event", "cancel_event", "user_decision"],
                    "description": "Apply this strategy to every detected conflict instead of the default rules"
                }
            }
        }),
    );

    push(
        "get_calendar_conflicts",
        "Detect conflicts among calendar events in a time range without resolving them.",
        false,
        json!({
            "type": "object",
            "properties": {
                "calendar_id": { "type": "string" },
                "start": { "type": "string" },
                "end": { "type": "string" }
            }
        }),
    );

    push(
        "apply_conflict_resolution",
        "Apply resolution strategies to previously detected conflicts by id.",
        false,
        json!({
            "type": "object",
            "properties": {
                "resolutions": {
                    "type": "array",
                    "description": "Entries of {conflict_id, strategy, user_decision?}"
                },
                "calendar_id": { "type": "string" },
                "start": { "type": "string" },
                "end": { "type": "string" }
            },
            "required": ["resolutions"]
        }),
    );

    push(
        "list_resources",
        "List recommended resources for the caller, optionally filtered by category.",
        true,
        json!({
            "type": "object",
            "properties": {
                "category": { "type": "string" }
            }
        }),
    );

    push(
        "search_resources",
        "Search learning resources by free-text query.",
        true,
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer", "description": "Maximum results, default 10" }
            },
            "required": ["query"]
        }),
    );

    specs
}
