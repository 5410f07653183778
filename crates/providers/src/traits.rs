use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dl_domain::error::Result;
use dl_domain::model::{CalendarEvent, CalendarInfo, EventDraft, EventPatch};
use dl_domain::tool::{AssistantMessage, Message, ToolDefinition};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Model identifier override. `None` uses the provider default.
    pub model: Option<String>,
}

/// Trait every LLM adapter implements.
///
/// Single-shot: the full response is returned at once. Tool-call arguments
/// arrive already parsed into structured JSON.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<AssistantMessage>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Calendar provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Verified caller identity threaded into every provider call. Supplied by
/// the orchestrator, never by the model.
#[derive(Debug, Clone)]
pub struct UserCtx {
    pub user_id: String,
}

impl UserCtx {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Abstract calendar backend. Wire compatibility with any specific vendor is
/// an adapter concern; all instants cross this boundary as UTC.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn list_events(
        &self,
        ctx: &UserCtx,
        calendar_id: &str,
        range: (DateTime<Utc>, DateTime<Utc>),
        max: usize,
    ) -> Result<Vec<CalendarEvent>>;

    async fn create_event(
        &self,
        ctx: &UserCtx,
        calendar_id: &str,
        draft: EventDraft,
    ) -> Result<CalendarEvent>;

    async fn update_event(
        &self,
        ctx: &UserCtx,
        calendar_id: &str,
        event_id: &str,
        patch: EventPatch,
    ) -> Result<CalendarEvent>;

    async fn delete_event(&self, ctx: &UserCtx, calendar_id: &str, event_id: &str) -> Result<()>;

    async fn list_calendars(&self, ctx: &UserCtx) -> Result<Vec<CalendarInfo>>;

    async fn validate_credentials(&self, ctx: &UserCtx) -> Result<bool>;
}
