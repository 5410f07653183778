use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigSeverity};

/// Which planner drives schedule generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlannerMode {
    /// Deterministic greedy planner.
    #[default]
    Heuristic,
    /// LLM-assisted planner with heuristic fallback.
    Llm,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub mode: PlannerMode,
    /// Default planning horizon in days.
    #[serde(default = "d_horizon_days")]
    pub horizon_days: u32,
    /// Deadline for the single-shot LLM planning call.
    #[serde(default = "d_llm_deadline_secs")]
    pub llm_deadline_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            mode: PlannerMode::default(),
            horizon_days: d_horizon_days(),
            llm_deadline_secs: d_llm_deadline_secs(),
        }
    }
}

fn d_horizon_days() -> u32 {
    7
}
fn d_llm_deadline_secs() -> u64 {
    60
}

impl PlannerConfig {
    pub(super) fn validate(&self, issues: &mut Vec<ConfigError>) {
        if self.horizon_days == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "planner.horizon_days".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.llm_deadline_secs == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "planner.llm_deadline_secs".into(),
                message: "must be at least 1".into(),
            });
        }
    }
}
