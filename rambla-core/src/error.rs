//! Error types for Rambla operations

use crate::ErrorKind;
use thiserror::Error;

/// Validation errors raised before the pipeline runs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("session id is not a valid UUID: {value}")]
    InvalidSession { value: String },

    #[error("language '{language}' is not in the supported set")]
    UnsupportedLanguage { language: String },

    #[error("coordinates out of range: lat {lat}, lon {lon}")]
    InvalidLocation { lat: f64, lon: f64 },

    #[error("invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSession { .. } | Self::InvalidField { .. } => ErrorKind::InvalidSession,
            Self::UnsupportedLanguage { .. } => ErrorKind::UnsupportedLanguage,
            Self::InvalidLocation { .. } => ErrorKind::InvalidLocation,
        }
    }
}

/// Durable-store errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("read failed for {entity}: {reason}")]
    ReadFailed { entity: &'static str, reason: String },

    #[error("write failed for {entity}: {reason}")]
    WriteFailed { entity: &'static str, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

/// Volatile cache errors. Callers are expected to log and swallow these;
/// the durable store remains authoritative.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    #[error("cache backend error: {reason}")]
    Backend { reason: String },
}

/// Model provider errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    #[error("no provider registered for '{label}'")]
    ProviderNotConfigured { label: String },

    #[error("request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("model call to {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },
}

/// Tool invocation errors. Inside the reason-act loop these are soft: they
/// flow back to the model as observations instead of failing the request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("tool {tool} failed: {reason}")]
    InvocationFailed { tool: String, reason: String },

    #[error("tool {tool} timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("model catalog has no profile for '{label}'")]
    MissingModel { label: String },

    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for the pipeline.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("conversation memory unavailable: {reason}")]
    MemoryUnavailable { reason: String },

    #[error("request deadline exceeded after {elapsed_ms}ms")]
    Timeout { elapsed_ms: i64 },

    #[error("request cancelled")]
    Cancelled,

    #[error("overloaded: {resource} at capacity")]
    Overloaded { resource: String },
}

impl AgentError {
    /// Map this error onto the internal taxonomy used by metrics and the
    /// user-facing error object.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(e) => e.kind(),
            Self::Storage(_) => ErrorKind::PersistenceFailed,
            Self::Cache(_) => ErrorKind::MemoryUnavailable,
            Self::Llm(LlmError::Timeout { .. }) => ErrorKind::Timeout,
            Self::Llm(_) => ErrorKind::ModelError,
            Self::Tool(_) => ErrorKind::ToolError,
            Self::Config(_) => ErrorKind::ModelError,
            Self::MemoryUnavailable { .. } => ErrorKind::MemoryUnavailable,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Overloaded { .. } => ErrorKind::Overloaded,
        }
    }
}

/// Result type alias for Rambla operations.
pub type AgentResult<T> = Result<T, AgentError>;

// ============================================================================
// TESTS
// ============================================================================
