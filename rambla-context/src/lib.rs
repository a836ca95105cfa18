//! Rambla Context - Prompt Assembly
//!
//! Pure transformers from conversation memory to model-facing messages and
//! the agent context record. Nothing here does IO; the orchestrator feeds
//! it a `MemoryWindow` and a `ValidatedContext` and passes the results on.

mod builder;
mod plan;

pub use builder::{AgentContext, ContextBuilder};
pub use plan::{DEFAULT_CITIES, PlanContextExtractor};
