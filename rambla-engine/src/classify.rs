//! Intent classification via a small fast model, with caching.

use rambla_core::{
    ChatMessage, Complexity, EngineConfig, Intent, IntentDecision, Language, LlmError,
    ModelProfile, short_hash,
};
use rambla_llm::{ChatRequest, ProviderRegistry};
use rambla_storage::{CacheBackend, intent_key};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const CLASSIFICATION_PROMPT: &str = "You classify queries for a place-discovery assistant. \
Reply with ONLY a JSON object, no prose:\n\
{\"intention\": \"SEARCH|RECOMMEND|PLAN|CHITCHAT\", \"confidence\": 0.0-1.0, \
\"complexity\": \"low|medium|high\", \"reasoning\": \"one short sentence\"}\n\n\
SEARCH: the user wants to find venues or locations.\n\
RECOMMEND: the user wants filtered or ranked suggestions.\n\
PLAN: the user wants a multi-stop outing or itinerary.\n\
CHITCHAT: small talk, greetings, anything else.\n\n\
Complexity rubric: low for single-location lookups or small talk; medium for \
filtered recommendations; high when the query involves multi-stop planning, \
temporal constraints, or group coordination.";

/// Decision threshold: below this confidence the intent defaults to
/// CHITCHAT with low complexity.
const MIN_CONFIDENCE: f32 = 0.5;

/// Model reply shape; `intention` is the wire name, `intent` accepted too.
#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(alias = "intent")]
    intention: String,
    confidence: f32,
    complexity: String,
    #[serde(default)]
    reasoning: String,
}

/// Classification result plus how it was obtained, for metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyOutcome {
    pub decision: IntentDecision,
    pub from_cache: bool,
    /// True when the model call or parse failed and the decision is the
    /// safe fallback
    pub degraded: bool,
}

/// Classifies queries with a single fast-model call, cached by a hash of
/// (normalized query, language, summary hash). Failures degrade to a
/// low-confidence CHITCHAT decision instead of failing the pipeline.
pub struct IntentClassifier {
    providers: Arc<ProviderRegistry>,
    cache: Arc<dyn CacheBackend>,
    profile: ModelProfile,
    cache_ttl: Duration,
    call_timeout: Duration,
}

impl IntentClassifier {
    pub fn new(
        config: &EngineConfig,
        providers: Arc<ProviderRegistry>,
        cache: Arc<dyn CacheBackend>,
    ) -> rambla_core::AgentResult<Self> {
        let profile = config.models.profile(&config.models.fast)?.clone();
        Ok(Self {
            providers,
            cache,
            profile,
            cache_ttl: Duration::from_secs(config.cache_ttl.intent_secs),
            call_timeout: Duration::from_millis(config.deadlines.model_call_ms),
        })
    }

    pub async fn classify(
        &self,
        query: &str,
        language: Language,
        summary: Option<&str>,
    ) -> ClassifyOutcome {
        let normalized = query.trim().to_lowercase();
        let summary_hash = short_hash(&[summary.unwrap_or("")]);
        let key = intent_key(&short_hash(&[&normalized, language.code(), &summary_hash]));

        match self.cache.get(&key).await {
            Ok(Some(raw)) => {
                if let Ok(decision) = serde_json::from_str::<IntentDecision>(&raw) {
                    return ClassifyOutcome { decision, from_cache: true, degraded: false };
                }
                tracing::warn!("cached intent decision unreadable, reclassifying");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "intent cache read failed");
            }
        }

        match self.call_model(query, language, summary).await {
            Ok(decision) => {
                if let Ok(raw) = serde_json::to_string(&decision) {
                    if let Err(e) = self.cache.set(&key, &raw, self.cache_ttl).await {
                        tracing::warn!(error = %e, "intent cache write failed");
                    }
                }
                ClassifyOutcome { decision, from_cache: false, degraded: false }
            }
            Err(reason) => {
                tracing::warn!(reason = %reason, "intent classification failed, degrading");
                ClassifyOutcome {
                    decision: IntentDecision::fallback(&reason),
                    from_cache: false,
                    degraded: true,
                }
            }
        }
    }

    async fn call_model(
        &self,
        query: &str,
        language: Language,
        summary: Option<&str>,
    ) -> Result<IntentDecision, String> {
        let provider = self
            .providers
            .get(&self.profile.provider)
            .map_err(|e| e.to_string())?;

        let mut user = format!("Language: {}\nQuery: {}", language.code(), query);
        if let Some(summary) = summary {
            user.push_str(&format!("\nConversation so far: {}", summary));
        }

        let request = ChatRequest::new(
            &self.profile.name,
            vec![ChatMessage::system(CLASSIFICATION_PROMPT), ChatMessage::user(user)],
        )
        .with_sampling(256, 0.0);

        let response = tokio::time::timeout(self.call_timeout, provider.chat(request))
            .await
            .map_err(|_| {
                LlmError::Timeout {
                    provider: self.profile.provider.clone(),
                    timeout_ms: self.call_timeout.as_millis() as u64,
                }
                .to_string()
            })?
            .map_err(|e| e.to_string())?;

        let text = response.text().ok_or_else(|| "classifier emitted a tool call".to_string())?;
        parse_decision(text)
    }
}

/// Parse the first JSON object in the reply into an `IntentDecision`,
/// applying the confidence floor.
fn parse_decision(text: &str) -> Result<IntentDecision, String> {
    let start = text.find('{').ok_or_else(|| "no JSON object in reply".to_string())?;
    let end = text.rfind('}').ok_or_else(|| "no JSON object in reply".to_string())?;
    if end < start {
        return Err("malformed JSON object in reply".to_string());
    }

    let raw: RawDecision =
        serde_json::from_str(&text[start..=end]).map_err(|e| e.to_string())?;

    let intent = Intent::from_str(&raw.intention).map_err(|e| e.to_string())?;
    let complexity = Complexity::from_str(&raw.complexity).map_err(|e| e.to_string())?;
    let confidence = raw.confidence.clamp(0.0, 1.0);

    if confidence < MIN_CONFIDENCE {
        return Ok(IntentDecision {
            intent: Intent::Chitchat,
            confidence,
            complexity: Complexity::Low,
            reasoning: raw.reasoning,
        });
    }

    Ok(IntentDecision { intent, confidence, complexity, reasoning: raw.reasoning })
}

// ============================================================================
// TESTS
// ============================================================================
