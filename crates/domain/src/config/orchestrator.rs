use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigSeverity};

/// Turn state-machine bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Assistant cycles allowed per turn before the bounded notice.
    #[serde(default = "d_max_assistant_turns")]
    pub max_assistant_turns: u32,
    /// Wall-clock budget for one whole turn.
    #[serde(default = "d_turn_deadline_secs")]
    pub turn_deadline_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_assistant_turns: d_max_assistant_turns(),
            turn_deadline_secs: d_turn_deadline_secs(),
        }
    }
}

fn d_max_assistant_turns() -> u32 {
    5
}
fn d_turn_deadline_secs() -> u64 {
    45
}

impl OrchestratorConfig {
    pub(super) fn validate(&self, issues: &mut Vec<ConfigError>) {
        if self.max_assistant_turns == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "orchestrator.max_assistant_turns".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.turn_deadline_secs == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "orchestrator.turn_deadline_secs".into(),
                message: "must be at least 1".into(),
            });
        }
    }
}
