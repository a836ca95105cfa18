//! Pipeline orchestrator: sequences the stages for one user turn.

use crate::classify::IntentClassifier;
use crate::emotion::EmotionDetector;
use crate::executor::{ExecutorConfig, ReactExecutor};
use crate::i18n::user_message;
use crate::limits::ConcurrencyLimiter;
use crate::metrics::{MetricsRecorder, QueryMetrics};
use crate::route::ModelRouter;
use crate::validate::{AgentRequest, ContextValidator};
use rambla_context::{ContextBuilder, DEFAULT_CITIES};
use rambla_core::{
    AgentError, AgentResult, Complexity, ConversationTurn, EngineConfig, EntityIdType, ErrorKind,
    Intent, Language, Place, RequestId, SessionId, META_ITINERARY, META_PLACES, META_PLAN_PARAMS,
};
use rambla_llm::ProviderRegistry;
use rambla_memory::ConversationBuffer;
use rambla_storage::{CacheBackend, ConversationStore, MetricsStore, PreferenceStore};
use rambla_tools::{CreateItineraryTool, PlaceSource, SearchPlacesTool, ToolContext, ToolRegistry};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Places persisted per turn in metadata; keeps rows bounded.
const MAX_PERSISTED_PLACES: usize = 10;

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// Execution counters surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMetadata {
    pub tool_calls: i32,
    pub reasoning_steps: i32,
    pub estimated_cost_usd: f64,
}

/// Successful pipeline result.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub response_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub places: Option<Vec<Place>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub itinerary: Option<serde_json::Value>,
    pub intention: Intent,
    pub confidence: f32,
    pub complexity: Complexity,
    pub model_used: String,
    pub processing_time_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_emotion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion_confidence: Option<f32>,
    pub metadata: ResponseMetadata,
    /// Echoed back so clients learn generated session ids
    pub session_id: SessionId,
}

/// User-visible failure: the error kind plus a localized message. Never
/// leaks internal identifiers or stack content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: &AgentError, language: Language) -> Self {
        let kind = error.kind();
        Self { error: kind, message: user_message(kind, language).to_string() }
    }
}

// ============================================================================
// TOOL SETUP
// ============================================================================

/// The core tool set: place search and itinerary creation against one
/// Places source, with search results cached under the places namespace.
pub fn standard_tools(
    source: Arc<dyn PlaceSource>,
    cache: Arc<dyn CacheBackend>,
    places_ttl: Duration,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(
        SearchPlacesTool::new(source.clone()).with_cache(cache, places_ttl),
    ));
    registry.register(Arc::new(CreateItineraryTool::new(source)));
    registry
}

// ============================================================================
// PIPELINE
// ============================================================================

/// The request orchestration engine. One instance serves many concurrent
/// requests; all cross-request state lives in the stores behind the ports.
pub struct AgentPipeline {
    config: EngineConfig,
    validator: ContextValidator,
    buffer: ConversationBuffer,
    builder: ContextBuilder,
    classifier: IntentClassifier,
    router: ModelRouter,
    executor: ReactExecutor,
    emotion: EmotionDetector,
    store: Arc<dyn ConversationStore>,
    recorder: MetricsRecorder,
}

impl AgentPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        conversation_store: Arc<dyn ConversationStore>,
        preference_store: Arc<dyn PreferenceStore>,
        metrics_store: Arc<dyn MetricsStore>,
        cache: Arc<dyn CacheBackend>,
        providers: Arc<ProviderRegistry>,
        tools: Arc<ToolRegistry>,
    ) -> AgentResult<Self> {
        config.validate()?;

        let validator = ContextValidator::new(&config, preference_store);
        let buffer = ConversationBuffer::new(
            conversation_store.clone(),
            cache.clone(),
            config.memory.clone(),
            Duration::from_secs(config.cache_ttl.memory_secs),
        );
        let builder =
            ContextBuilder::new(config.memory.max_tokens, config.system_prompt.as_deref())?;
        let classifier = IntentClassifier::new(&config, providers.clone(), cache)?;
        let router = ModelRouter::new(config.models.clone());
        let executor = ReactExecutor::new(
            providers,
            tools,
            Arc::new(ConcurrencyLimiter::new(
                "model calls",
                config.limits.max_model_calls,
                config.limits.max_queued,
            )),
            Arc::new(ConcurrencyLimiter::new(
                "tool calls",
                config.limits.max_tool_calls,
                config.limits.max_queued,
            )),
            ExecutorConfig::from_engine(&config),
        );
        let recorder = MetricsRecorder::new(metrics_store);

        Ok(Self {
            config,
            validator,
            buffer,
            builder,
            classifier,
            router,
            executor,
            emotion: EmotionDetector::new(),
            store: conversation_store,
            recorder,
        })
    }

    /// Run the full pipeline for one request.
    ///
    /// On error no turn is persisted; metrics are recorded either way. The
    /// caller turns an `Err` into a localized `ErrorBody`.
    pub async fn handle(
        &self,
        request: AgentRequest,
        cancel: CancellationToken,
    ) -> AgentResult<AgentResponse> {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(self.config.deadlines.per_request_ms);
        let mut metrics = QueryMetrics::start(RequestId::now_v7(), &request.user_id);

        // 1. Validate context
        let context = match self.validator.validate(&request).await {
            Ok(context) => context,
            Err(e) => return Err(self.abort(&mut metrics, e).await),
        };
        metrics.record_session(context.session_id);

        // 2. Load conversational memory
        let window = match self
            .buffer
            .load_window(context.session_id, &request.query, context.language)
            .await
        {
            Ok(window) => window,
            Err(e) => return Err(self.abort(&mut metrics, e).await),
        };

        // 3. Build agent context (captures merged plan parameters)
        let known_cities: Vec<&str> = DEFAULT_CITIES.to_vec();
        let agent_context =
            self.builder.build_agent_context(&window, &context, &request.query, &known_cities);

        // 4. Emotion is response metadata only
        let (emotion, emotion_confidence) = self.emotion.detect(&request.query);
        let tone = self.emotion.tone_instruction(emotion);

        // 5. Classify and route
        let classified = self
            .classifier
            .classify(&request.query, context.language, window.session_summary.as_deref())
            .await;
        metrics.record_classification(
            classified.decision.intent,
            classified.decision.confidence,
            classified.decision.complexity,
            classified.degraded,
        );

        let decision = match self.router.route(
            classified.decision.intent,
            classified.decision.complexity,
            context.budget_mode,
            context.preferred_model.as_deref(),
        ) {
            Ok(decision) => decision,
            Err(e) => return Err(self.abort(&mut metrics, e).await),
        };
        metrics.record_model(&decision);

        // 6. Reason-act loop
        let messages = self.builder.build_messages(&window, &context, &request.query, Some(tone));
        let tool_context = ToolContext::new(context.language)
            .with_location(context.location)
            .with_plan_params(agent_context.plan_params.clone());

        let outcome = match self
            .executor
            .execute(&decision, messages, &tool_context, deadline, &cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.abort(&mut metrics, e).await),
        };

        metrics.record_execution(
            outcome.trace.len() as i32,
            outcome.iterations,
            outcome.places.len() as i32,
            outcome.usage,
            &decision,
        );

        // 7. Persist the turn (best-effort after a successful response)
        let duration_ms = started.elapsed().as_millis() as i64;
        let mut turn_metadata = json!({
            META_PLAN_PARAMS: agent_context.plan_params,
            "detected_emotion": emotion.as_str(),
            "truncated": outcome.truncated,
        });
        if !outcome.places.is_empty() {
            let persisted: Vec<&Place> =
                outcome.places.iter().take(MAX_PERSISTED_PLACES).collect();
            turn_metadata[META_PLACES] = json!(persisted);
        }
        if let Some(itinerary) = &outcome.itinerary {
            turn_metadata[META_ITINERARY] = itinerary.clone();
        }

        let turn =
            ConversationTurn::new(context.session_id, &context.user_id, &request.query, &outcome.response_text)
                .with_language(context.language)
                .with_classification(
                    classified.decision.intent,
                    classified.decision.confidence,
                    classified.decision.complexity,
                )
                .with_model(&decision.provider, &decision.model)
                .with_usage(
                    outcome.usage.input_tokens,
                    outcome.usage.output_tokens,
                    metrics.estimated_cost_usd,
                )
                .with_duration_ms(duration_ms)
                .with_metadata(turn_metadata);

        match self.store.append_turn(&turn).await {
            Ok(()) => {
                // 8. Invalidate the session's cached window after the append
                self.buffer.invalidate(context.session_id).await;
            }
            Err(e) => {
                tracing::error!(session_id = %context.session_id, error = %e, "turn persistence failed");
                metrics.note_error(ErrorKind::PersistenceFailed);
            }
        }

        // 9. Finalize metrics
        metrics.mark_end();
        self.recorder.submit(&metrics).await;

        // 10. Respond
        Ok(AgentResponse {
            response_text: outcome.response_text,
            places: if outcome.places.is_empty() { None } else { Some(outcome.places) },
            itinerary: outcome.itinerary,
            intention: classified.decision.intent,
            confidence: classified.decision.confidence,
            complexity: classified.decision.complexity,
            model_used: decision.model,
            processing_time_ms: metrics.duration_ms,
            detected_emotion: Some(emotion.as_str().to_string()),
            emotion_confidence: Some(emotion_confidence),
            metadata: ResponseMetadata {
                tool_calls: metrics.tool_calls,
                reasoning_steps: metrics.reasoning_steps,
                estimated_cost_usd: metrics.estimated_cost_usd,
            },
            session_id: context.session_id,
        })
    }

    async fn abort(&self, metrics: &mut QueryMetrics, error: AgentError) -> AgentError {
        metrics.fail(error.kind());
        metrics.mark_end();
        self.recorder.submit(metrics).await;
        error
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
