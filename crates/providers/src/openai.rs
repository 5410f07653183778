//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, and any other endpoint that
//! follows the OpenAI chat completions contract. Single-shot only: the full
//! response is read at once and tool-call argument strings are parsed into
//! structured JSON before they leave this module.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use dl_domain::config::LlmConfig;
use dl_domain::error::{Error, Result};
use dl_domain::tool::{AssistantMessage, Message, Role, ToolCall, ToolDefinition};

use crate::traits::{CompletionRequest, LlmProvider};

/// An LLM provider adapter for any OpenAI-compatible API endpoint.
///
/// Concurrent calls are bounded by a per-process semaphore sized from
/// `llm.max_concurrent_requests`.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl OpenAiCompatProvider {
    /// Create a provider from config. The API key is resolved from the
    /// environment variable named in `llm.api_key_env`; keys never live in
    /// config files.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env).map_err(|_| {
            Error::Auth(format!(
                "environment variable '{}' not set or not valid UTF-8",
                cfg.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: format!("openai-compat:{}", cfg.base_url),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            client,
            permits: Arc::new(Semaphore::new(cfg.max_concurrent_requests.max(1))),
        })
    }

    fn build_chat_body(&self, req: &CompletionRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();

        let mut body = serde_json::json!({
            "model": req.model.clone().unwrap_or_else(|| self.default_model.clone()),
            "messages": messages,
            "temperature": req.temperature.unwrap_or(self.temperature),
            "max_tokens": req.max_tokens.unwrap_or(self.max_tokens),
        });

        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.iter().map(tool_to_openai).collect());
        }

        body
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn complete(&self, req: CompletionRequest) -> Result<AssistantMessage> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("provider semaphore closed".into()))?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(&req);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        let raw = response.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            let retryable = status.as_u16() == 429 || status.is_server_error();
            let snippet: String = raw.chars().take(300).collect();
            return Err(Error::Upstream {
                service: "llm".into(),
                message: format!("HTTP {status}: {snippet}"),
                retryable,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&raw)
            .map_err(|e| Error::upstream("llm", format!("malformed completion payload: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::upstream("llm", "completion contained no choices"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(wire_tool_call)
            .collect();

        Ok(AssistantMessage {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
        })
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire conversion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Convert a [`reqwest::Error`] into the domain error. Timeouts map to
/// `Deadline`; connection failures are retryable upstream errors.
fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Deadline(e.to_string())
    } else if e.is_connect() {
        Error::upstream_retryable("llm", e.to_string())
    } else {
        Error::upstream("llm", e.to_string())
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::System => serde_json::json!({ "role": "system", "content": msg.content }),
        Role::User => serde_json::json!({ "role": "user", "content": msg.content }),
        Role::Assistant => {
            let mut value = serde_json::json!({ "role": "assistant", "content": msg.content });
            if !msg.tool_calls.is_empty() {
                value["tool_calls"] = Value::Array(
                    msg.tool_calls
                        .iter()
                        .map(|tc| {
                            serde_json::json!({
                                "id": tc.call_id,
                                "type": "function",
                                "function": {
                                    "name": tc.tool_name,
                                    "arguments": tc.arguments.to_string(),
                                },
                            })
                        })
                        .collect(),
                );
            }
            value
        }
        Role::Tool => serde_json::json!({
            "role": "tool",
            "content": msg.content,
            "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
        }),
    }
}

fn tool_to_openai(def: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": def.name,
            "description": def.description,
            "parameters": def.parameters,
        },
    })
}

fn wire_tool_call(wire: WireToolCall) -> ToolCall {
    // The wire carries arguments as a serialized string; parse exactly once
    // here so downstream code always sees structured JSON.
    let arguments = if wire.function.arguments.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        match serde_json::from_str(&wire.function.arguments) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    call_id = %wire.id,
                    tool = %wire.function.name,
                    error = %e,
                    "tool call arguments are not valid JSON; defaulting to empty object"
                );
                Value::Object(Default::default())
            }
        }
    };

    ToolCall {
        call_id: wire.id,
        tool_name: wire.function.name,
        arguments,
    }
}

// ── Wire shapes ────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, serde::Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, serde::Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, serde::Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, serde::Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}
