//! Calendar conflict engine.
//!
//! Detection is a pure function over a set of events: no state is held
//! between calls, conflict ids are derived from the participating event ids,
//! and the same input always yields the same conflict set. Persisting
//! unresolved conflicts, if needed, is the caller's job.

mod auto;
mod detect;
mod resolve;
mod types;

pub use auto::{auto_resolve, conflict_statistics, AutoResolveRules, ConflictStatistics};
pub use detect::{detect_conflicts, Detection};
pub use resolve::{resolve_conflict, Resolution, UserDecision};
pub use types::{Conflict, ConflictKind, ConflictSeverity, ResolutionStrategy};
