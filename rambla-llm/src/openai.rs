//! OpenAI-compatible HTTP adapter with rate limiting.

use crate::{ChatContent, ChatProvider, ChatRequest, ChatResponse};
use async_trait::async_trait;
use rambla_core::{AgentResult, LlmError, MessageRole, TokenUsage};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const PROVIDER: &str = "openai";

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    max_tokens: i32,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct WireTool {
    r#type: &'static str,
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    model: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireToolCall {
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded argument object
    arguments: String,
}

#[derive(Debug, Clone, Deserialize)]
struct WireUsage {
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: Option<i64>,
}

// ============================================================================
// PROVIDER
// ============================================================================

/// Chat provider speaking the OpenAI chat-completions protocol.
/// A semaphore caps in-flight requests per process.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: Arc<Semaphore>,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Create a provider against the public OpenAI endpoint.
    pub fn new(api_key: impl Into<String>, max_in_flight: usize, timeout: Duration) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com/v1", max_in_flight, timeout)
    }

    /// Create a provider against a compatible endpoint (proxy, gateway).
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        max_in_flight: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            rate_limiter: Arc::new(Semaphore::new(max_in_flight.max(1))),
            timeout,
        }
    }

    fn to_wire(request: &ChatRequest) -> WireRequest {
        WireRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: match m.role {
                        MessageRole::System => "system",
                        MessageRole::User => "user",
                        MessageRole::Assistant => "assistant",
                        MessageRole::Tool => "tool",
                    }
                    .to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            tools: request
                .tools
                .iter()
                .map(|t| WireTool {
                    r#type: "function",
                    function: WireFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }

    fn from_wire(response: WireResponse) -> AgentResult<ChatResponse> {
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "response has no choices".to_string(),
            }
        })?;

        let content = if let Some(call) = choice.message.tool_calls.into_iter().next() {
            let arguments =
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    LlmError::InvalidResponse {
                        provider: PROVIDER.to_string(),
                        reason: format!("tool arguments are not valid JSON: {}", e),
                    }
                })?;
            ChatContent::ToolCall { name: call.function.name, arguments }
        } else {
            ChatContent::Text { text: choice.message.content.unwrap_or_default() }
        };

        let usage = response.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens as i32,
            output_tokens: u.completion_tokens.unwrap_or(0) as i32,
        });

        Ok(ChatResponse { content, usage, model: response.model })
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(&self, request: ChatRequest) -> AgentResult<ChatResponse> {
        let _permit = self.rate_limiter.acquire().await.map_err(|e| {
            LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: 0,
                message: format!("rate limiter closed: {}", e),
            }
        })?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::to_wire(&request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        provider: PROVIDER.to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    LlmError::RequestFailed {
                        provider: PROVIDER.to_string(),
                        status: 0,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(LlmError::RateLimited {
                provider: PROVIDER.to_string(),
                retry_after_ms,
            }
            .into());
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "model provider request failed");
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: status.as_u16() as i32,
                message,
            }
            .into());
        }

        let wire: WireResponse = response.json().await.map_err(|e| {
            LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            }
        })?;

        Self::from_wire(wire)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rambla_core::ChatMessage;

    #[test]
    fn test_wire_request_roles() {
        let request = ChatRequest::new(
            "gpt-4o-mini",
            vec![
                ChatMessage::system("sys"),
                ChatMessage::user("hi"),
                ChatMessage::assistant("hello"),
                ChatMessage::tool("{\"ok\":true}"),
            ],
        );
        let wire = OpenAiProvider::to_wire(&request);
        let roles: Vec<&str> = wire.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
    }

    #[test]
    fn test_wire_tools_skipped_when_empty() {
        let request = ChatRequest::new("m", vec![ChatMessage::user("q")]);
        let wire = OpenAiProvider::to_wire(&request);
        let json = serde_json::to_value(&wire).unwrap();
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_from_wire_text_response() {
        let wire = WireResponse {
            choices: vec![WireChoice {
                message: WireResponseMessage {
                    content: Some("hola".to_string()),
                    tool_calls: vec![],
                },
            }],
            usage: Some(WireUsage { prompt_tokens: 12, completion_tokens: Some(3) }),
            model: "gpt-4o-mini".to_string(),
        };
        let response = OpenAiProvider::from_wire(wire).unwrap();
        assert_eq!(response.text(), Some("hola"));
        assert_eq!(response.usage.unwrap().input_tokens, 12);
    }

    #[test]
    fn test_from_wire_tool_call() {
        let wire = WireResponse {
            choices: vec![WireChoice {
                message: WireResponseMessage {
                    content: None,
                    tool_calls: vec![WireToolCall {
                        function: WireFunctionCall {
                            name: "search_places".to_string(),
                            arguments: "{\"query\":\"bar\",\"city\":\"Zaragoza\"}".to_string(),
                        },
                    }],
                },
            }],
            usage: None,
            model: "gpt-4o-mini".to_string(),
        };
        let response = OpenAiProvider::from_wire(wire).unwrap();
        match response.content {
            ChatContent::ToolCall { name, arguments } => {
                assert_eq!(name, "search_places");
                assert_eq!(arguments["city"], "Zaragoza");
            }
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn test_from_wire_rejects_bad_arguments() {
        let wire = WireResponse {
            choices: vec![WireChoice {
                message: WireResponseMessage {
                    content: None,
                    tool_calls: vec![WireToolCall {
                        function: WireFunctionCall {
                            name: "search_places".to_string(),
                            arguments: "not json".to_string(),
                        },
                    }],
                },
            }],
            usage: None,
            model: "m".to_string(),
        };
        assert!(OpenAiProvider::from_wire(wire).is_err());
    }

    #[test]
    fn test_from_wire_rejects_empty_choices() {
        let wire = WireResponse { choices: vec![], usage: None, model: "m".to_string() };
        assert!(OpenAiProvider::from_wire(wire).is_err());
    }
}
