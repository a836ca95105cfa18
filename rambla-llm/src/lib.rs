//! Rambla LLM - Provider Abstraction Layer
//!
//! Provider-agnostic trait for chat-completion models with tool calling.
//! Each external provider gets its own adapter; the registry hands the
//! pipeline an opaque `ChatProvider` looked up by provider name.

mod mock;
mod openai;

pub use mock::ScriptedChatProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use rambla_core::{AgentResult, ChatMessage, LlmError, TokenUsage, ToolSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

/// One chat-completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call this turn; empty disables tool calling
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    pub max_tokens: i32,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(model: &str, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.to_string(),
            messages,
            tools: Vec::new(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_sampling(mut self, max_tokens: i32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

/// What the model emitted: a final text answer or a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContent {
    Text { text: String },
    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },
}

/// Response from one chat-completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: ChatContent,
    /// Provider-reported usage; None when the provider omits it
    pub usage: Option<TokenUsage>,
    pub model: String,
}

impl ChatResponse {
    /// Final text, if this response carries one.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            ChatContent::Text { text } => Some(text),
            ChatContent::ToolCall { .. } => None,
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self.content, ChatContent::ToolCall { .. })
    }
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// Trait for chat-completion providers with tool calling.
/// Implementations must be thread-safe (Send + Sync); the executor calls
/// them concurrently across requests.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider identifier used by the model catalog (e.g. "openai").
    fn name(&self) -> &str;

    /// Run one chat-completion call.
    async fn chat(&self, request: ChatRequest) -> AgentResult<ChatResponse>;
}

// ============================================================================
// PROVIDER REGISTRY
// ============================================================================

/// Registry of chat providers by provider name.
/// Providers must be explicitly registered - no auto-discovery.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name. Replaces any previous
    /// registration for that name.
    pub fn register(&mut self, provider: Arc<dyn ChatProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> AgentResult<Arc<dyn ChatProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LlmError::ProviderNotConfigured { label: name.to_string() }.into())
    }

    pub fn has(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
