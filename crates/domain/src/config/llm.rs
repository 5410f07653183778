use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigSeverity};

/// LLM provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat-completions endpoint base URL.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Environment variable holding the API key. Keys never live in config.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    /// Per-request timeout.
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-process bound on concurrent provider calls.
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Backoff parameters for retryable upstream failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "d_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "d_min_wait_ms")]
    pub min_wait_ms: u64,
    #[serde(default = "d_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            model: d_model(),
            api_key_env: d_api_key_env(),
            temperature: d_temperature(),
            max_tokens: d_max_tokens(),
            timeout_secs: d_timeout_secs(),
            max_concurrent_requests: d_max_concurrent(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: d_max_attempts(),
            min_wait_ms: d_min_wait_ms(),
            max_wait_ms: d_max_wait_ms(),
        }
    }
}

fn d_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn d_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn d_api_key_env() -> String {
    "DAYLOOM_LLM_API_KEY".into()
}
fn d_temperature() -> f32 {
    0.7
}
fn d_max_tokens() -> u32 {
    4096
}
fn d_timeout_secs() -> u64 {
    60
}
fn d_max_concurrent() -> usize {
    4
}
fn d_max_attempts() -> u32 {
    3
}
fn d_min_wait_ms() -> u64 {
    4_000
}
fn d_max_wait_ms() -> u64 {
    10_000
}

impl LlmConfig {
    pub(super) fn validate(&self, issues: &mut Vec<ConfigError>) {
        if self.base_url.is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.base_url".into(),
                message: "must not be empty".into(),
            });
        }
        if self.max_concurrent_requests == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.max_concurrent_requests".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.retry.max_attempts == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.retry.max_attempts".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.retry.min_wait_ms > self.retry.max_wait_ms {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.retry".into(),
                message: "min_wait_ms must not exceed max_wait_ms".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.temperature".into(),
                message: "outside the usual 0.0-2.0 range".into(),
            });
        }
    }
}
