//! External service adapters.
//!
//! `LlmProvider` and `CalendarProvider` are the only two ways the core talks
//! to the outside world. Adapters translate between the internal types and
//! each vendor's wire format; the rest of the codebase never sees a vendor
//! payload.

mod memory_calendar;
mod openai;
mod resources;
mod retry;
mod traits;

pub use memory_calendar::InMemoryCalendarProvider;
pub use openai::OpenAiCompatProvider;
pub use resources::{ResourceRecommender, ResourceSummary};
pub use retry::{retry_with_backoff, Backoff};
pub use traits::{CalendarProvider, CompletionRequest, LlmProvider, UserCtx};
