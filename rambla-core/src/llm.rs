//! LLM-related primitive types.
//!
//! Pure data types for chat-completion exchanges. Traits and provider
//! adapters live in rambla-llm.

use serde::{Deserialize, Serialize};

// ============================================================================
// MESSAGES
// ============================================================================

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    /// Tool observation fed back to the model
    Tool,
}

/// A single message in a chat-completion exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Tool, content: content.into() }
    }
}

// ============================================================================
// TOOL SPECS
// ============================================================================

/// Prompt-facing description of a callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments
    pub parameters: serde_json::Value,
}

// ============================================================================
// TOKEN USAGE
// ============================================================================

/// Token counts for one model call. Provider-reported when available,
/// estimated otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i32,
    pub output_tokens: i32,
}

impl TokenUsage {
    pub fn new(input_tokens: i32, output_tokens: i32) -> Self {
        Self { input_tokens, output_tokens }
    }

    pub fn total(&self) -> i32 {
        self.input_tokens + self.output_tokens
    }

    /// Accumulate another call's usage.
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

// ============================================================================
// TOKEN ESTIMATION
// ============================================================================

/// Estimate token count for text.
/// Rough approximation: 1 token per 4 characters, rounded up.
pub fn estimate_tokens(text: &str) -> i32 {
    if text.is_empty() {
        return 0;
    }
    ((text.len() + 3) / 4) as i32
}

// ============================================================================
// TESTS
// ============================================================================
