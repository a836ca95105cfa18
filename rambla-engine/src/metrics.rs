//! Per-query metrics and the hourly aggregate recorder.

use chrono::{Timelike, Utc};
use rambla_core::{
    Complexity, ErrorKind, Intent, ModelDecision, RequestId, SessionId, Timestamp, TokenUsage,
};
use rambla_storage::{MetricsStore, MetricsUpdate};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

// ============================================================================
// QUERY METRICS
// ============================================================================

/// Everything recorded about one pipeline run. Created at request start,
/// finalized at the end, then folded into the hourly aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct QueryMetrics {
    pub request_id: RequestId,
    pub user_id: String,
    pub session_id: Option<SessionId>,
    pub started_at: Timestamp,
    #[serde(skip)]
    started: Option<Instant>,
    pub duration_ms: i64,

    // Classification
    pub intent: Option<Intent>,
    pub confidence: f32,
    pub complexity: Option<Complexity>,
    pub classification_degraded: bool,

    // Routing
    pub model: Option<String>,
    pub provider: Option<String>,

    // Execution
    pub tool_calls: i32,
    pub reasoning_steps: i32,
    pub places_found: i32,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub estimated_cost_usd: f64,

    // Outcome
    pub success: bool,
    pub error: Option<ErrorKind>,
}

impl QueryMetrics {
    /// Start the clock for a new request.
    pub fn start(request_id: RequestId, user_id: &str) -> Self {
        Self {
            request_id,
            user_id: user_id.to_string(),
            session_id: None,
            started_at: Utc::now(),
            started: Some(Instant::now()),
            duration_ms: 0,
            intent: None,
            confidence: 0.0,
            complexity: None,
            classification_degraded: false,
            model: None,
            provider: None,
            tool_calls: 0,
            reasoning_steps: 0,
            places_found: 0,
            input_tokens: 0,
            output_tokens: 0,
            estimated_cost_usd: 0.0,
            success: true,
            error: None,
        }
    }

    pub fn record_session(&mut self, session_id: SessionId) {
        self.session_id = Some(session_id);
    }

    pub fn record_classification(&mut self, intent: Intent, confidence: f32, complexity: Complexity, degraded: bool) {
        self.intent = Some(intent);
        self.confidence = confidence;
        self.complexity = Some(complexity);
        self.classification_degraded = degraded;
        if degraded {
            self.error = Some(ErrorKind::ClassificationFailed);
        }
    }

    pub fn record_model(&mut self, decision: &ModelDecision) {
        self.model = Some(decision.model.clone());
        self.provider = Some(decision.provider.clone());
    }

    /// Record execution counters and price the token usage with the routed
    /// model's per-token costs. Provider-reported counts arrive through
    /// `usage`; estimates are the caller's fallback.
    pub fn record_execution(
        &mut self,
        tool_calls: i32,
        reasoning_steps: i32,
        places_found: i32,
        usage: TokenUsage,
        decision: &ModelDecision,
    ) {
        self.tool_calls = tool_calls;
        self.reasoning_steps = reasoning_steps;
        self.places_found = places_found;
        self.input_tokens = usage.input_tokens;
        self.output_tokens = usage.output_tokens;
        self.estimated_cost_usd = decision.estimate_cost(usage.input_tokens, usage.output_tokens);
    }

    /// Mark the request failed with a classified error.
    pub fn fail(&mut self, kind: ErrorKind) {
        self.success = false;
        self.error = Some(kind);
    }

    /// Note a soft failure that did not stop the request.
    pub fn note_error(&mut self, kind: ErrorKind) {
        self.error = Some(kind);
    }

    /// Stop the clock.
    pub fn mark_end(&mut self) {
        if let Some(started) = self.started {
            self.duration_ms = started.elapsed().as_millis() as i64;
        }
    }

    /// The hourly bucket this query belongs to.
    pub fn bucket_hour(&self) -> Timestamp {
        self.started_at
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(self.started_at)
    }
}

// ============================================================================
// RECORDER
// ============================================================================

/// Folds finalized query metrics into the durable hourly aggregates.
/// Recording is best-effort: a failing metrics store is logged, never
/// propagated into the request path.
pub struct MetricsRecorder {
    store: Arc<dyn MetricsStore>,
}

impl MetricsRecorder {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    pub async fn submit(&self, metrics: &QueryMetrics) {
        let model = metrics.model.as_deref().unwrap_or("unrouted");
        let update = MetricsUpdate {
            success: metrics.success,
            tokens: (metrics.input_tokens + metrics.output_tokens) as i64,
            cost_usd: metrics.estimated_cost_usd,
            duration_ms: metrics.duration_ms,
        };

        if let Err(e) = self.store.record(metrics.bucket_hour(), model, update).await {
            tracing::warn!(error = %e, request_id = %metrics.request_id, "metrics submit failed");
        }

        tracing::info!(
            request_id = %metrics.request_id,
            intent = metrics.intent.map(|i| i.as_str()).unwrap_or("-"),
            model,
            duration_ms = metrics.duration_ms,
            tool_calls = metrics.tool_calls,
            cost_usd = metrics.estimated_cost_usd,
            success = metrics.success,
            error = metrics.error.map(|e| e.as_str()).unwrap_or("-"),
            "query recorded"
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rambla_core::EntityIdType;
    use rambla_storage::MemoryMetricsStore;

    fn decision() -> ModelDecision {
        ModelDecision {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2048,
            temperature: 0.7,
            input_cost_per_1k: 0.00015,
            output_cost_per_1k: 0.0006,
        }
    }

    #[test]
    fn test_metrics_lifecycle() {
        let mut metrics = QueryMetrics::start(RequestId::now_v7(), "u1");
        metrics.record_session(SessionId::now_v7());
        metrics.record_classification(Intent::Search, 0.9, Complexity::Low, false);
        let decision = decision();
        metrics.record_model(&decision);
        metrics.record_execution(1, 2, 3, TokenUsage::new(1000, 500), &decision);
        metrics.mark_end();

        assert!(metrics.success);
        assert_eq!(metrics.tool_calls, 1);
        assert_eq!(metrics.places_found, 3);
        assert!((metrics.estimated_cost_usd - 0.00045).abs() < 1e-9);
    }

    #[test]
    fn test_degraded_classification_noted() {
        let mut metrics = QueryMetrics::start(RequestId::now_v7(), "u1");
        metrics.record_classification(Intent::Chitchat, 0.0, Complexity::Low, true);
        assert_eq!(metrics.error, Some(ErrorKind::ClassificationFailed));
        // A degraded classification alone does not fail the request
        assert!(metrics.success);
    }

    #[test]
    fn test_bucket_hour_truncation() {
        let metrics = QueryMetrics::start(RequestId::now_v7(), "u1");
        let bucket = metrics.bucket_hour();
        assert_eq!(bucket.minute(), 0);
        assert_eq!(bucket.second(), 0);
        assert_eq!(bucket.hour(), metrics.started_at.hour());
    }

    #[tokio::test]
    async fn test_recorder_aggregates() {
        let store = Arc::new(MemoryMetricsStore::new());
        let recorder = MetricsRecorder::new(store.clone());

        let mut metrics = QueryMetrics::start(RequestId::now_v7(), "u1");
        let d = decision();
        metrics.record_model(&d);
        metrics.record_execution(1, 1, 0, TokenUsage::new(100, 50), &d);
        metrics.mark_end();
        recorder.submit(&metrics).await;

        let mut failed = QueryMetrics::start(RequestId::now_v7(), "u1");
        failed.record_model(&d);
        failed.fail(ErrorKind::Timeout);
        failed.mark_end();
        recorder.submit(&failed).await;

        let bucket = store
            .bucket(metrics.bucket_hour(), "gpt-4o-mini")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bucket.queries, 2);
        assert_eq!(bucket.success, 1);
        assert_eq!(bucket.failure, 1);
        assert_eq!(bucket.total_tokens, 150);
    }

    #[tokio::test]
    async fn test_unrouted_requests_bucketed() {
        let store = Arc::new(MemoryMetricsStore::new());
        let recorder = MetricsRecorder::new(store.clone());

        let mut metrics = QueryMetrics::start(RequestId::now_v7(), "u1");
        metrics.fail(ErrorKind::InvalidSession);
        metrics.mark_end();
        recorder.submit(&metrics).await;

        let bucket = store.bucket(metrics.bucket_hour(), "unrouted").await.unwrap().unwrap();
        assert_eq!(bucket.failure, 1);
    }
}
