//! The turn state machine.
//!
//! START → CALL_MODEL → (decide) → DISPATCH_TOOLS → CALL_MODEL … → FINALIZE.
//! One turn runs cooperatively on a single logical execution: tool calls are
//! dispatched sequentially in emission order, so causal metadata is
//! well-defined. The whole turn races a wall-clock deadline; metadata
//! accumulated before the deadline survives cancellation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use dl_domain::clock::{Clock, IdProvider};
use dl_domain::config::{Config, OrchestratorConfig};
use dl_domain::error::Result;
use dl_domain::model::{MessageRole, StoredMessage};
use dl_domain::tool::{Message, ToolCall, ToolError, ToolErrorKind};
use dl_providers::{retry_with_backoff, Backoff, CompletionRequest, LlmProvider};
use dl_repository::MessageRepository;

use crate::locks::ConversationLockMap;
use crate::prompt::system_prompt;
use crate::registry::{ToolCtx, ToolEffect, ToolRegistry};

/// Fixed assistant text when the model stays unavailable after retries.
const LLM_FAILURE_TEXT: &str = "I apologize, but I encountered an error processing your request. \
     Please try again or rephrase your message.";

/// Fixed assistant text when the turn deadline trips.
const TIMEOUT_TEXT: &str = "Processing took too long and I had to stop early. \
     Any changes already made have been kept.";

/// Deterministic notice when the assistant-turn cap trips.
const BOUNDED_TEXT: &str = "I reached the limit of actions I can take in one turn. \
     Ask me to continue and I will pick up where I left off.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / result types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single conversation turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_id: String,
    pub conversation_id: String,
    pub message: String,
    /// Opaque caller context woven into the system prompt.
    pub context: Option<Value>,
}

/// What a turn produced: the reply plus its causal metadata.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TurnResult {
    pub response_text: String,
    /// Tool names in dispatch order, including failed calls.
    pub tools_invoked: Vec<String>,
    pub bricks_created: Vec<String>,
    pub bricks_updated: Vec<String>,
    pub resources_recommended: Vec<String>,
    pub schedule_updated: bool,
    pub suggestions: Vec<String>,
}

/// Per-turn accumulator. Shared behind `Arc` so a deadline cancellation
/// cannot lose what already happened.
#[derive(Debug, Clone, Default)]
struct TurnMeta {
    tools_invoked: Vec<String>,
    bricks_created: Vec<String>,
    bricks_updated: Vec<String>,
    resources_recommended: Vec<String>,
    schedule_updated: bool,
}

impl TurnMeta {
    fn record(&mut self, effect: ToolEffect) {
        match effect {
            ToolEffect::BrickCreated(id) => self.bricks_created.push(id),
            ToolEffect::BrickUpdated(id) => self.bricks_updated.push(id),
            ToolEffect::ScheduleUpdated => self.schedule_updated = true,
            ToolEffect::ResourcesRecommended(ids) => self.resources_recommended.extend(ids),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    registry: ToolRegistry,
    messages: Arc<dyn MessageRepository>,
    config: OrchestratorConfig,
    retry: Backoff,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdProvider>,
    locks: ConversationLockMap,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: ToolRegistry,
        messages: Arc<dyn MessageRepository>,
        config: &Config,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            provider,
            registry,
            messages,
            config: config.orchestrator,
            retry: Backoff::from(config.llm.retry),
            clock,
            ids,
            locks: ConversationLockMap::new(),
        }
    }

    /// Run one turn: load history, drive the model/tool loop, finalize.
    ///
    /// Turns for the same conversation are serialized; turns across
    /// conversations run in parallel. The turn always completes within the
    /// configured deadline, falling back to a fixed notice when it trips.
    pub async fn process_turn(&self, req: TurnRequest) -> Result<TurnResult> {
        let _permit = self.locks.acquire(&req.conversation_id).await?;

        let span = tracing::info_span!(
            "turn",
            user_id = %req.user_id,
            conversation_id = %req.conversation_id,
        );

        let meta = Arc::new(Mutex::new(TurnMeta::default()));
        let deadline = Duration::from_secs(self.config.turn_deadline_secs);

        let run = self.run_turn(&req, meta.clone()).instrument(span);
        let response_text = match tokio::time::timeout(deadline, run).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "turn failed internally");
                LLM_FAILURE_TEXT.to_owned()
            }
            Err(_) => {
                tracing::warn!(
                    deadline_secs = self.config.turn_deadline_secs,
                    "turn deadline exceeded"
                );
                TIMEOUT_TEXT.to_owned()
            }
        };

        // FINALIZE: the user/assistant pair is durable even on fallback paths.
        self.persist_pair(&req, &response_text).await;

        let meta = meta.lock().clone();
        let suggestions = derive_suggestions(&meta);
        Ok(TurnResult {
            response_text,
            tools_invoked: meta.tools_invoked,
            bricks_created: meta.bricks_created,
            bricks_updated: meta.bricks_updated,
            resources_recommended: meta.resources_recommended,
            schedule_updated: meta.schedule_updated,
            suggestions,
        })
    }

    async fn run_turn(&self, req: &TurnRequest, meta: Arc<Mutex<TurnMeta>>) -> Result<String> {
        let history = self.messages.history(&req.conversation_id).await?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system_prompt(req.context.as_ref())));
        messages.extend(history.iter().map(stored_to_message));
        messages.push(Message::user(&req.message));

        let tool_defs = self.registry.definitions();
        let ctx = ToolCtx {
            user_id: req.user_id.clone(),
        };

        let mut assistant_turns: u32 = 0;
        loop {
            // ── CALL_MODEL ───────────────────────────────────────────
            let completion = CompletionRequest {
                messages: messages.clone(),
                tools: tool_defs.clone(),
                temperature: None,
                max_tokens: None,
                model: None,
            };
            let assistant = match retry_with_backoff(self.retry, || {
                self.provider.complete(completion.clone())
            })
            .await
            {
                Ok(assistant) => assistant,
                Err(e) => {
                    tracing::warn!(error = %e, "model unavailable after retries");
                    return Ok(LLM_FAILURE_TEXT.to_owned());
                }
            };
            assistant_turns += 1;
            messages.push(Message::from_assistant(&assistant));

            // ── decide ───────────────────────────────────────────────
            if assistant_turns > self.config.max_assistant_turns {
                tracing::warn!(assistant_turns, "assistant turn cap exceeded, forcing finalize");
                return Ok(BOUNDED_TEXT.to_owned());
            }
            if !assistant.has_tool_calls() {
                return Ok(assistant.content);
            }

            // ── DISPATCH_TOOLS (sequential, in emission order) ───────
            for call in &assistant.tool_calls {
                meta.lock().tools_invoked.push(call.tool_name.clone());

                let arguments = match ingress_arguments(call) {
                    Ok(arguments) => arguments,
                    Err(tool_err) => {
                        messages.push(Message::tool_result(&call.call_id, tool_err.to_payload()));
                        continue;
                    }
                };
                let call = ToolCall {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    arguments,
                };

                let outcome = self.registry.dispatch(&ctx, &call).await;
                tracing::debug!(
                    tool = %call.tool_name,
                    is_error = outcome.is_error,
                    "tool dispatched"
                );
                if !outcome.is_error {
                    if let Some(effect) = outcome.effect.clone() {
                        meta.lock().record(effect);
                    }
                }
                messages.push(Message::tool_result(&call.call_id, &outcome.content));
            }
        }
    }

    async fn persist_pair(&self, req: &TurnRequest, response: &str) {
        let now = self.clock.now();
        let pair = [
            (MessageRole::User, req.message.as_str()),
            (MessageRole::Assistant, response),
        ];
        for (role, content) in pair {
            let message = StoredMessage {
                id: self.ids.new_id(),
                conversation_id: req.conversation_id.clone(),
                user_id: req.user_id.clone(),
                role,
                content: content.to_owned(),
                tool_call_id: None,
                created_at: now,
            };
            if let Err(e) = self.messages.append_message(message).await {
                tracing::warn!(error = %e, "failed to persist turn message");
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Argument ingress: a serialized string form is parsed exactly once here;
/// everything downstream sees structured JSON.
fn ingress_arguments(call: &ToolCall) -> std::result::Result<Value, ToolError> {
    match &call.arguments {
        Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
            ToolError::new(
                ToolErrorKind::Validation,
                format!("tool arguments were not valid JSON: {e}"),
            )
            .with_hint("emit arguments as a JSON object matching the tool schema")
        }),
        other => Ok(other.clone()),
    }
}

fn stored_to_message(stored: &StoredMessage) -> Message {
    match stored.role {
        MessageRole::User => Message::user(&stored.content),
        MessageRole::Assistant => Message::assistant(&stored.content),
        MessageRole::Tool => Message::tool_result(
            stored.tool_call_id.clone().unwrap_or_default(),
            &stored.content,
        ),
    }
}

/// Heuristic follow-ups derived from the turn's causal metadata.
fn derive_suggestions(meta: &TurnMeta) -> Vec<String> {
    let mut suggestions = Vec::new();
    if meta.schedule_updated {
        suggestions.push("Review today's schedule to confirm the new plan.".to_owned());
    }
    if !meta.bricks_created.is_empty() {
        suggestions.push("Break your new Brick into Quantas to make it actionable.".to_owned());
    }
    if !meta.resources_recommended.is_empty() {
        suggestions.push("Skim the recommended resources and save the useful ones.".to_owned());
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestions_follow_causal_metadata() {
        let mut meta = TurnMeta::default();
        assert!(derive_suggestions(&meta).is_empty());

        meta.record(ToolEffect::ScheduleUpdated);
        meta.record(ToolEffect::BrickCreated("b1".into()));
        let suggestions = derive_suggestions(&meta);
        assert_eq!(suggestions.len(), 2);
        assert!(suggestions[0].contains("schedule"));
        assert!(suggestions[1].contains("Quantas"));
    }

    #[test]
    fn string_arguments_parse_once_at_ingress() {
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "create_brick".into(),
            arguments: Value::String(r#"{"title":"X"}"#.into()),
        };
        let parsed = ingress_arguments(&call).unwrap();
        assert_eq!(parsed["title"], "X");

        let bad = ToolCall {
            call_id: "c2".into(),
            tool_name: "create_brick".into(),
            arguments: Value::String("{broken".into()),
        };
        let err = ingress_arguments(&bad).unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::Validation);
    }

    #[test]
    fn tool_history_restores_call_id() {
        let stored = StoredMessage {
            id: "m1".into(),
            conversation_id: "c1".into(),
            user_id: "u1".into(),
            role: MessageRole::Tool,
            content: "ok".into(),
            tool_call_id: Some("call_7".into()),
            created_at: "2024-01-15T08:00:00Z".parse().unwrap(),
        };
        let message = stored_to_message(&stored);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_7"));
    }
}
