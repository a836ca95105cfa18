//! Reason-act executor: bounded loop of model calls and tool invocations.

use crate::limits::ConcurrencyLimiter;
use rambla_core::{
    AgentError, AgentResult, ChatMessage, EngineConfig, Language, LlmError, ModelDecision, Place,
    TokenUsage, ToolCallRecord, ToolOutcome, estimate_tokens,
};
use rambla_llm::{ChatContent, ChatRequest, ChatResponse, ProviderRegistry};
use rambla_tools::{ToolContext, ToolRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

// ============================================================================
// CONFIG / OUTCOME
// ============================================================================

/// Executor knobs, lifted from the engine configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_iterations: usize,
    pub model_call_timeout: Duration,
    pub tool_call_timeout: Duration,
}

impl ExecutorConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            max_iterations: config.max_reasoning_iterations,
            model_call_timeout: Duration::from_millis(config.deadlines.model_call_ms),
            tool_call_timeout: Duration::from_millis(config.deadlines.tool_call_ms),
        }
    }
}

/// Result of one reason-act execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub response_text: String,
    /// Every tool call, in step order
    pub trace: Vec<ToolCallRecord>,
    /// Iterations used (= reasoning steps)
    pub iterations: i32,
    pub usage: TokenUsage,
    /// True when the loop hit max_iterations without a final answer
    pub truncated: bool,
    /// Places surfaced by tool observations, deduplicated by id
    pub places: Vec<Place>,
    /// The last itinerary produced, if any tool emitted one
    pub itinerary: Option<serde_json::Value>,
}

// ============================================================================
// EXECUTOR
// ============================================================================

/// Runs the `[reason -> maybe act -> observe]*` loop on a routed model.
///
/// Tool errors never crash the loop; they flow back to the model as
/// observations. Exactly one tool call runs per iteration. Cancellation and
/// the request deadline cut through both model and tool calls.
pub struct ReactExecutor {
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolRegistry>,
    model_limiter: Arc<ConcurrencyLimiter>,
    tool_limiter: Arc<ConcurrencyLimiter>,
    config: ExecutorConfig,
}

impl ReactExecutor {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        tools: Arc<ToolRegistry>,
        model_limiter: Arc<ConcurrencyLimiter>,
        tool_limiter: Arc<ConcurrencyLimiter>,
        config: ExecutorConfig,
    ) -> Self {
        Self { providers, tools, model_limiter, tool_limiter, config }
    }

    pub async fn execute(
        &self,
        decision: &ModelDecision,
        mut messages: Vec<ChatMessage>,
        tool_context: &ToolContext,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> AgentResult<ExecutionOutcome> {
        let started = Instant::now();
        let tool_specs = self.tools.specs();

        let mut trace: Vec<ToolCallRecord> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut places: Vec<Place> = Vec::new();
        let mut itinerary: Option<serde_json::Value> = None;
        let mut model_responses = 0usize;
        let mut last_model_error: Option<AgentError> = None;

        for step in 1..=self.config.max_iterations {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(AgentError::Timeout {
                    elapsed_ms: started.elapsed().as_millis() as i64,
                });
            }

            let request = ChatRequest::new(&decision.model, messages.clone())
                .with_tools(tool_specs.clone())
                .with_sampling(decision.max_tokens, decision.temperature);
            let request_tokens = request_estimate(&request);

            let response = match self
                .call_model(decision, request, deadline, cancel)
                .await
            {
                Ok(response) => response,
                Err(e @ (AgentError::Cancelled | AgentError::Timeout { .. })) => return Err(e),
                Err(e) if is_recoverable_model_error(&e) => {
                    tracing::warn!(step, error = %e, "model call failed, retrying next iteration");
                    last_model_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            model_responses += 1;

            match response.usage {
                Some(reported) => usage.add(reported),
                None => usage.add(TokenUsage::new(request_tokens, response_estimate(&response))),
            }

            match response.content {
                ChatContent::Text { text } => {
                    return Ok(ExecutionOutcome {
                        response_text: text,
                        trace,
                        iterations: step as i32,
                        usage,
                        truncated: false,
                        places,
                        itinerary,
                    });
                }
                ChatContent::ToolCall { name, arguments } => {
                    let call_started = Instant::now();
                    let outcome = self
                        .call_tool(&name, arguments.clone(), tool_context, deadline, cancel)
                        .await?;
                    let duration_ms = call_started.elapsed().as_millis() as i64;

                    messages.push(ChatMessage::assistant(format!(
                        "[tool_call] {} {}",
                        name, arguments
                    )));
                    match &outcome {
                        ToolOutcome::Ok { observation } => {
                            collect_places(observation, &mut places);
                            if name == "create_itinerary" {
                                itinerary = Some(observation.clone());
                            }
                            messages.push(ChatMessage::tool(observation.to_string()));
                        }
                        ToolOutcome::Error { message } => {
                            // Surfaced to the model so it can recover
                            messages.push(ChatMessage::tool(format!("[tool_error] {}", message)));
                        }
                    }

                    trace.push(ToolCallRecord {
                        step: step as i32,
                        tool: name,
                        arguments,
                        outcome,
                        duration_ms,
                    });
                }
            }
        }

        // Loop exhausted. With no usable model response at all this is a
        // provider failure, not a truncation.
        if model_responses == 0 {
            return Err(last_model_error.unwrap_or_else(|| {
                LlmError::InvalidResponse {
                    provider: decision.provider.clone(),
                    reason: "no model response within iteration budget".to_string(),
                }
                .into()
            }));
        }

        Ok(ExecutionOutcome {
            response_text: interim_answer(tool_context.language, &places),
            trace,
            iterations: self.config.max_iterations as i32,
            usage,
            truncated: true,
            places,
            itinerary,
        })
    }

    async fn call_model(
        &self,
        decision: &ModelDecision,
        request: ChatRequest,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> AgentResult<ChatResponse> {
        let _permit = self.model_limiter.acquire().await?;
        let provider = self.providers.get(&decision.provider)?;
        let timeout = remaining(self.config.model_call_timeout, deadline);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            result = tokio::time::timeout(timeout, provider.chat(request)) => match result {
                Ok(response) => response,
                Err(_) => Err(LlmError::Timeout {
                    provider: decision.provider.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into()),
            },
        }
    }

    /// Invoke one tool. Tool-level failures become soft observations; only
    /// cancellation and overload propagate as hard errors.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        tool_context: &ToolContext,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> AgentResult<ToolOutcome> {
        let tool = match self.tools.get(name) {
            Ok(tool) => tool,
            Err(e) => return Ok(ToolOutcome::Error { message: e.to_string() }),
        };

        let _permit = self.tool_limiter.acquire().await?;
        let timeout = remaining(self.config.tool_call_timeout, deadline);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            result = tokio::time::timeout(timeout, tool.invoke(arguments, tool_context)) => result,
        };

        match result {
            Ok(Ok(observation)) => Ok(ToolOutcome::Ok { observation }),
            Ok(Err(e)) => {
                tracing::warn!(tool = name, error = %e, "tool invocation failed");
                Ok(ToolOutcome::Error { message: e.to_string() })
            }
            Err(_) => {
                tracing::warn!(tool = name, timeout_ms = timeout.as_millis() as u64, "tool timed out");
                Ok(ToolOutcome::Error {
                    message: format!("tool {} timed out after {}ms", name, timeout.as_millis()),
                })
            }
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn remaining(per_call: Duration, deadline: Instant) -> Duration {
    per_call.min(deadline.saturating_duration_since(Instant::now()))
}

fn is_recoverable_model_error(error: &AgentError) -> bool {
    match error {
        AgentError::Llm(LlmError::RateLimited { .. }) => true,
        AgentError::Llm(LlmError::Timeout { .. }) => true,
        // 5xx and transport failures are worth retrying; 4xx is not
        AgentError::Llm(LlmError::RequestFailed { status, .. }) => {
            *status == 0 || *status == 429 || *status >= 500
        }
        _ => false,
    }
}

fn request_estimate(request: &ChatRequest) -> i32 {
    request.messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

fn response_estimate(response: &ChatResponse) -> i32 {
    match &response.content {
        ChatContent::Text { text } => estimate_tokens(text),
        ChatContent::ToolCall { arguments, .. } => estimate_tokens(&arguments.to_string()),
    }
}

/// Pull place records out of a tool observation's `places` array.
fn collect_places(observation: &serde_json::Value, places: &mut Vec<Place>) {
    let Some(found) = observation.get("places").and_then(|v| v.as_array()) else {
        return;
    };
    for value in found {
        if let Ok(place) = serde_json::from_value::<Place>(value.clone()) {
            if !places.iter().any(|p| p.id == place.id) {
                places.push(place);
            }
        }
    }
}

/// Best interim answer when the iteration budget runs out mid-task.
fn interim_answer(language: Language, places: &[Place]) -> String {
    let names = places.iter().take(3).map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ");
    match (language, places.is_empty()) {
        (Language::Es, false) => format!(
            "No me ha dado tiempo a terminar, pero esto es lo que encontré: {}.",
            names
        ),
        (Language::Es, true) => {
            "No me ha dado tiempo a completar la petición. ¿Puedes intentarlo de nuevo?".to_string()
        }
        (Language::En, false) => {
            format!("I ran out of time, but here is what I found so far: {}.", names)
        }
        (Language::En, true) => {
            "I couldn't finish the request in time. Could you try again?".to_string()
        }
        (Language::Ca, false) => {
            format!("No m'ha donat temps a acabar, però això és el que he trobat: {}.", names)
        }
        (Language::Ca, true) => {
            "No he pogut completar la petició a temps. Pots tornar-ho a provar?".to_string()
        }
        (Language::Gl, false) => {
            format!("Non me deu tempo a rematar, pero isto é o que atopei: {}.", names)
        }
        (Language::Gl, true) => {
            "Non puiden completar a petición a tempo. Podes tentalo de novo?".to_string()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
