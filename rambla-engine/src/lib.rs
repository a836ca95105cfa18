//! Rambla Engine - Request Orchestration
//!
//! Sequences the pipeline stages for each user turn: validate context, load
//! memory, build the prompt, classify intent, route a model, run the
//! reason-act loop, persist the turn, and record metrics. The orchestrator
//! is the only component aware of all the others; lower layers expose pure
//! data upward and never call back in.

mod classify;
mod emotion;
mod executor;
mod i18n;
mod limits;
mod metrics;
mod orchestrator;
mod route;
mod validate;

pub use classify::{ClassifyOutcome, IntentClassifier};
pub use emotion::EmotionDetector;
pub use executor::{ExecutionOutcome, ExecutorConfig, ReactExecutor};
pub use i18n::user_message;
pub use limits::{ConcurrencyLimiter, LimiterPermit};
pub use metrics::{MetricsRecorder, QueryMetrics};
pub use orchestrator::{AgentPipeline, AgentResponse, ErrorBody, ResponseMetadata, standard_tools};
pub use route::ModelRouter;
pub use validate::{AgentRequest, ContextValidator};
