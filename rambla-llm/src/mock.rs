//! Scripted chat provider for testing.

use crate::{ChatContent, ChatProvider, ChatRequest, ChatResponse};
use async_trait::async_trait;
use rambla_core::{AgentError, AgentResult, LlmError, TokenUsage};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Chat provider that replays a scripted sequence of outcomes.
///
/// Each `chat` call pops the next scripted outcome and records the request
/// for later inspection. An exhausted script is an `InvalidResponse` error,
/// which makes under-scripted tests fail loudly instead of hanging.
pub struct ScriptedChatProvider {
    name: String,
    script: Mutex<VecDeque<AgentResult<ChatResponse>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatProvider {
    pub fn new() -> Self {
        Self::named("openai")
    }

    /// A scripted provider that registers under a specific provider name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a final text answer.
    pub fn push_text(&self, text: &str) {
        self.push_response(ChatResponse {
            content: ChatContent::Text { text: text.to_string() },
            usage: Some(TokenUsage::new(100, 25)),
            model: "scripted".to_string(),
        });
    }

    /// Queue a tool call.
    pub fn push_tool_call(&self, tool: &str, arguments: serde_json::Value) {
        self.push_response(ChatResponse {
            content: ChatContent::ToolCall { name: tool.to_string(), arguments },
            usage: Some(TokenUsage::new(100, 15)),
            model: "scripted".to_string(),
        });
    }

    /// Queue a full response.
    pub fn push_response(&self, response: ChatResponse) {
        self.script.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a provider failure.
    pub fn push_error(&self, error: AgentError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of scripted outcomes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

impl Default for ScriptedChatProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for ScriptedChatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: ChatRequest) -> AgentResult<ChatResponse> {
        self.requests.lock().unwrap().push(request);
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(LlmError::InvalidResponse {
                provider: self.name.clone(),
                reason: "script exhausted".to_string(),
            }
            .into())
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
