//! Schedule generation.
//!
//! Two planners share one contract: the deterministic greedy
//! [`HeuristicPlanner`] and the [`LlmPlanner`], which asks a model for a
//! schedule, validates the structured output, and falls back to the
//! heuristic when the model fails. Callers pick via `planner.mode` in
//! config; both return the same `PlanResult` shape.

mod heuristic;
mod llm;
mod slots;

pub use heuristic::HeuristicPlanner;
pub use llm::LlmPlanner;
pub use slots::{candidate_slots, Slot};

use std::sync::Arc;

use async_trait::async_trait;

use dl_domain::clock::Clock;
use dl_domain::config::{PlannerConfig, PlannerMode};
use dl_domain::error::Result;
use dl_domain::model::{CalendarEvent, Constraint, PlanResult, Preferences, TaskSpec};
use dl_providers::LlmProvider;

/// Everything a planner needs for one run.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub tasks: Vec<TaskSpec>,
    pub existing_events: Vec<CalendarEvent>,
    pub preferences: Preferences,
    pub constraints: Vec<Constraint>,
    pub horizon_days: u32,
}

/// Allocates tasks to free time slots subject to preferences and
/// constraints.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, req: &PlanRequest) -> Result<PlanResult>;
}

/// Build the planner selected by `planner.mode`.
pub fn planner_from_config(
    config: &PlannerConfig,
    provider: Arc<dyn LlmProvider>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn Planner> {
    match config.mode {
        PlannerMode::Heuristic => Arc::new(HeuristicPlanner::new(clock)),
        PlannerMode::Llm => Arc::new(LlmPlanner::new(provider, clock, config)),
    }
}
