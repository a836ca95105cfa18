//! Rambla Memory - Conversation Memory Buffer
//!
//! Produces a token-bounded `MemoryWindow` for a session: the most recent
//! turns verbatim, older turns folded into a deterministic summary, and the
//! places mentioned recently for coreference resolution. The durable store
//! is the source of truth; the cache is a short-TTL shadow that is
//! invalidated after every turn append.

use rambla_core::{
    AgentError, AgentResult, ConversationTurn, Language, MemoryConfig, MemoryWindow, MessageRole,
    PlaceRef, PlanState, RecentMessage, SessionId, estimate_tokens,
};
use rambla_storage::{CacheBackend, ConversationStore, memory_key, memory_key_pattern};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Turns scanned for place references.
const PLACE_SCAN_TURNS: usize = 3;

/// Places taken from a single turn.
const PLACES_PER_TURN: usize = 10;

/// Place names quoted in the session summary.
const SUMMARY_PLACE_NAMES: usize = 3;

// ============================================================================
// BUFFER
// ============================================================================

/// Conversation memory buffer with sliding window, compression, and cache
/// coherence. Stateless between calls; all continuity lives in the store
/// and cache, so any worker can serve any session.
pub struct ConversationBuffer {
    store: Arc<dyn ConversationStore>,
    cache: Arc<dyn CacheBackend>,
    config: MemoryConfig,
    cache_ttl: Duration,
}

impl ConversationBuffer {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        cache: Arc<dyn CacheBackend>,
        config: MemoryConfig,
        cache_ttl: Duration,
    ) -> Self {
        Self { store, cache, config, cache_ttl }
    }

    /// Load the memory window for a session.
    ///
    /// Cache hits are returned unchanged. On a miss the window is rebuilt
    /// from the durable store and cached under a short TTL. Cache failures
    /// degrade to the durable path; durable-read failures are hard errors.
    pub async fn load_window(
        &self,
        session_id: SessionId,
        current_query: &str,
        language: Language,
    ) -> AgentResult<MemoryWindow> {
        let key = memory_key(session_id, &self.config.fingerprint());

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<MemoryWindow>(&raw) {
                Ok(window) => {
                    tracing::debug!(%session_id, "memory window served from cache");
                    return Ok(window);
                }
                Err(e) => {
                    tracing::warn!(%session_id, error = %e, "cached memory window unreadable, rebuilding");
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "memory cache read failed, falling back to store");
            }
        }

        let turns = self
            .store
            .session_history(session_id, self.config.max_long_term_turns)
            .await
            .map_err(|e| AgentError::MemoryUnavailable { reason: e.to_string() })?;

        let window = build_window(&turns, &self.config, language);
        tracing::debug!(
            %session_id,
            total_turns = window.total_turns,
            estimated_tokens = window.estimated_tokens,
            query_len = current_query.len(),
            "memory window built from store"
        );

        match serde_json::to_string(&window) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(&key, &raw, self.cache_ttl).await {
                    tracing::warn!(%session_id, error = %e, "memory cache write failed");
                }
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "memory window serialization failed");
            }
        }

        Ok(window)
    }

    /// Drop every cached window for the session. Called by the orchestrator
    /// after each successful turn append; cache failures are swallowed.
    pub async fn invalidate(&self, session_id: SessionId) {
        match self.cache.delete_pattern(&memory_key_pattern(session_id)).await {
            Ok(removed) => {
                tracing::debug!(%session_id, removed, "memory cache invalidated");
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "memory cache invalidation failed");
            }
        }
    }
}

// ============================================================================
// WINDOW CONSTRUCTION (pure)
// ============================================================================

/// Build a memory window from a chronological slice of persisted turns.
/// Pure function of its inputs; the buffer wraps it with IO.
pub fn build_window(
    turns: &[ConversationTurn],
    config: &MemoryConfig,
    language: Language,
) -> MemoryWindow {
    if turns.is_empty() {
        return MemoryWindow::empty();
    }

    let split = turns.len().saturating_sub(config.max_short_term_turns);
    let (older, recent_turns) = turns.split_at(split);

    let mut session_summary =
        if older.is_empty() { None } else { Some(summarize_turns(older, language)) };

    let mut recent = Vec::with_capacity(recent_turns.len() * 2);
    let n = recent_turns.len();
    for (i, turn) in recent_turns.iter().enumerate() {
        // 1 = most recent persisted turn
        let turn_index = (n - i) as i32;
        recent.push(RecentMessage {
            role: MessageRole::User,
            text: turn.query.clone(),
            turn_index,
        });
        recent.push(RecentMessage {
            role: MessageRole::Assistant,
            text: turn.response.clone(),
            turn_index,
        });
    }

    let previous_places = extract_places(recent_turns);

    let mut estimated = window_tokens(session_summary.as_deref(), &recent);
    let threshold = (config.compression_threshold * config.max_tokens as f32).ceil() as i32;

    if estimated >= threshold {
        let target = (config.max_tokens as f32 * 0.9).floor() as i32;
        // Always folds at least one message once the threshold is crossed
        let mut dropped = 0usize;
        while !recent.is_empty() {
            let removed = recent.remove(0);
            estimated -= estimate_tokens(&removed.text);
            dropped += 1;
            if estimated <= target {
                break;
            }
        }
        if dropped > 0 {
            let note = compression_note(dropped, language);
            session_summary = Some(match session_summary {
                Some(summary) => format!("{} {}", summary, note),
                None => note,
            });
            estimated = window_tokens(session_summary.as_deref(), &recent);
        }
        // A pathological summary can still blow the budget on its own
        if estimated > config.max_tokens {
            let message_tokens: i32 = recent.iter().map(|m| estimate_tokens(&m.text)).sum();
            let budget = (config.max_tokens - message_tokens).max(0);
            session_summary = session_summary.map(|s| truncate_to_tokens(&s, budget));
            estimated = window_tokens(session_summary.as_deref(), &recent);
        }
    }

    MemoryWindow {
        recent,
        previous_places,
        session_summary,
        total_turns: turns.len() as i32,
        estimated_tokens: estimated,
        plan_params: accumulate_plan_params(turns),
    }
}

/// Fold persisted plan slots oldest-to-newest so later turns win scalar
/// slots and list slots accumulate.
fn accumulate_plan_params(turns: &[ConversationTurn]) -> PlanState {
    let mut state = PlanState::default();
    for turn in turns {
        if let Some(params) = turn.plan_params() {
            state = PlanState::merge(&state, &PlanState::from_metadata(params));
        }
    }
    state
}

fn window_tokens(summary: Option<&str>, recent: &[RecentMessage]) -> i32 {
    summary.map(estimate_tokens).unwrap_or(0)
        + recent.iter().map(|m| estimate_tokens(&m.text)).sum::<i32>()
}

/// Deterministic summary of older turns: turn count, intent frequencies in
/// descending order, and representative places. Never fabricates content
/// beyond what the persisted turns carry.
fn summarize_turns(turns: &[ConversationTurn], language: Language) -> String {
    let mut intent_counts: HashMap<&'static str, usize> = HashMap::new();
    let mut total_places = 0usize;
    let mut place_names: Vec<String> = Vec::new();

    for turn in turns {
        *intent_counts.entry(turn.intent.as_str()).or_default() += 1;
        let places = turn.places();
        total_places += places.len();
        for place in places {
            if place_names.len() < SUMMARY_PLACE_NAMES
                && !place_names.iter().any(|n| n.eq_ignore_ascii_case(&place.name))
            {
                place_names.push(place.name);
            }
        }
    }

    let mut counts: Vec<(&str, usize)> = intent_counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    let topics = counts
        .iter()
        .map(|(intent, count)| format!("{}: {}", intent, count))
        .collect::<Vec<_>>()
        .join(", ");

    let mut parts = Vec::with_capacity(4);
    match language {
        Language::Es => {
            parts.push(format!("Conversación previa: {} mensajes anteriores.", turns.len()));
            parts.push(format!("Temas: {}.", topics));
            if total_places > 0 {
                parts.push(format!("Se discutieron {} lugares en total.", total_places));
            }
            if !place_names.is_empty() {
                parts.push(format!("Lugares destacados: {}.", place_names.join(", ")));
            }
        }
        Language::En => {
            parts.push(format!("Earlier conversation: {} previous turns.", turns.len()));
            parts.push(format!("Topics: {}.", topics));
            if total_places > 0 {
                parts.push(format!("{} places were discussed in total.", total_places));
            }
            if !place_names.is_empty() {
                parts.push(format!("Notable places: {}.", place_names.join(", ")));
            }
        }
        Language::Ca => {
            parts.push(format!("Conversa prèvia: {} missatges anteriors.", turns.len()));
            parts.push(format!("Temes: {}.", topics));
            if total_places > 0 {
                parts.push(format!("Es van comentar {} llocs en total.", total_places));
            }
            if !place_names.is_empty() {
                parts.push(format!("Llocs destacats: {}.", place_names.join(", ")));
            }
        }
        Language::Gl => {
            parts.push(format!("Conversa previa: {} mensaxes anteriores.", turns.len()));
            parts.push(format!("Temas: {}.", topics));
            if total_places > 0 {
                parts.push(format!("Discutíronse {} lugares en total.", total_places));
            }
            if !place_names.is_empty() {
                parts.push(format!("Lugares destacados: {}.", place_names.join(", ")));
            }
        }
    }
    parts.join(" ")
}

fn compression_note(dropped: usize, language: Language) -> String {
    match language {
        Language::Es => format!("[{} mensajes antiguos comprimidos]", dropped),
        Language::En => format!("[{} earlier messages compressed]", dropped),
        Language::Ca => format!("[{} missatges antics comprimits]", dropped),
        Language::Gl => format!("[{} mensaxes antigas comprimidas]", dropped),
    }
}

/// Scan the most recent turns for place references, most recent first,
/// deduplicated by name.
fn extract_places(recent_turns: &[ConversationTurn]) -> Vec<PlaceRef> {
    let mut refs: Vec<PlaceRef> = Vec::new();

    for (turn_index, turn) in recent_turns.iter().rev().take(PLACE_SCAN_TURNS).enumerate() {
        for (position, place) in turn.places().into_iter().take(PLACES_PER_TURN).enumerate() {
            if refs.iter().any(|r| r.name.eq_ignore_ascii_case(&place.name)) {
                continue;
            }
            refs.push(PlaceRef {
                name: place.name.clone(),
                rating: place.rating,
                category: place.primary_category().map(str::to_string),
                turn_index: (turn_index + 1) as i32,
                position: (position + 1) as i32,
            });
        }
    }

    refs
}

/// Truncate text so its token estimate fits a budget, respecting char
/// boundaries.
fn truncate_to_tokens(text: &str, budget: i32) -> String {
    if budget <= 0 {
        return String::new();
    }
    let max_bytes = budget as usize * 4;
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rambla_core::{EntityIdType, Intent, StorageError};
    use rambla_storage::{MemoryCache, MemoryConversationStore};
    use serde_json::json;

    fn turn(session: SessionId, query: &str, response: &str) -> ConversationTurn {
        ConversationTurn::new(session, "u1", query, response)
    }

    fn turn_with_places(session: SessionId, names: &[&str]) -> ConversationTurn {
        let places: Vec<serde_json::Value> = names
            .iter()
            .map(|n| json!({"id": n.to_lowercase(), "name": n, "rating": 4.2, "categories": ["bar"]}))
            .collect();
        turn(session, "buscar bares", "aquí tienes")
            .with_classification(Intent::Search, 0.9, rambla_core::Complexity::Low)
            .with_metadata(json!({"places": places}))
    }

    fn buffer(
        store: Arc<dyn ConversationStore>,
        cache: Arc<dyn CacheBackend>,
    ) -> ConversationBuffer {
        ConversationBuffer::new(store, cache, MemoryConfig::default(), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_empty_session_yields_empty_window() {
        let store = Arc::new(MemoryConversationStore::new());
        let cache = Arc::new(MemoryCache::new());
        let buf = buffer(store, cache);

        let window = buf
            .load_window(SessionId::now_v7(), "hola", Language::Es)
            .await
            .unwrap();
        assert!(window.recent.is_empty());
        assert!(window.session_summary.is_none());
        assert!(window.previous_places.is_empty());
        assert_eq!(window.estimated_tokens, 0);
    }

    #[tokio::test]
    async fn test_short_history_no_summary() {
        let store = Arc::new(MemoryConversationStore::new());
        let session = SessionId::now_v7();
        for i in 0..10 {
            store.append_turn(&turn(session, &format!("q{}", i), "r")).await.unwrap();
        }
        let buf = buffer(store, Arc::new(MemoryCache::new()));

        let window = buf.load_window(session, "next", Language::Es).await.unwrap();
        assert_eq!(window.recent_turn_count(), 10);
        assert_eq!(window.recent.len(), 20);
        assert!(window.session_summary.is_none());
        assert_eq!(window.total_turns, 10);
    }

    #[tokio::test]
    async fn test_long_history_generates_summary() {
        let store = Arc::new(MemoryConversationStore::new());
        let session = SessionId::now_v7();
        for i in 0..15 {
            store.append_turn(&turn(session, &format!("q{}", i), "r")).await.unwrap();
        }
        let buf = buffer(store, Arc::new(MemoryCache::new()));

        let window = buf.load_window(session, "next", Language::Es).await.unwrap();
        assert_eq!(window.recent_turn_count(), 10);
        // Oldest recent message is q5
        assert_eq!(window.recent[0].text, "q5");
        let summary = window.session_summary.unwrap();
        assert!(summary.contains("5 mensajes anteriores"));
        assert!(summary.contains("CHITCHAT: 5"));
        assert_eq!(window.total_turns, 15);
    }

    #[tokio::test]
    async fn test_summary_localized() {
        let store = Arc::new(MemoryConversationStore::new());
        let session = SessionId::now_v7();
        for i in 0..12 {
            store.append_turn(&turn(session, &format!("q{}", i), "r")).await.unwrap();
        }
        let buf = buffer(store, Arc::new(MemoryCache::new()));

        let window = buf.load_window(session, "next", Language::En).await.unwrap();
        assert!(window.session_summary.unwrap().starts_with("Earlier conversation"));
    }

    #[tokio::test]
    async fn test_previous_places_most_recent_first_deduped() {
        let store = Arc::new(MemoryConversationStore::new());
        let session = SessionId::now_v7();
        store.append_turn(&turn_with_places(session, &["Bar Uno", "Bar Dos"])).await.unwrap();
        store.append_turn(&turn_with_places(session, &["Bar Dos", "Bar Tres"])).await.unwrap();
        let buf = buffer(store, Arc::new(MemoryCache::new()));

        let window = buf.load_window(session, "el segundo", Language::Es).await.unwrap();
        let names: Vec<&str> = window.previous_places.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Bar Dos", "Bar Tres", "Bar Uno"]);
        // Most recent turn is index 1
        assert_eq!(window.previous_places[0].turn_index, 1);
        assert_eq!(window.previous_places[2].turn_index, 2);
        assert_eq!(window.previous_places[0].position, 1);
    }

    #[tokio::test]
    async fn test_compression_respects_budget() {
        let store = Arc::new(MemoryConversationStore::new());
        let session = SessionId::now_v7();
        let long = "x".repeat(1000);
        for _ in 0..20 {
            store.append_turn(&turn(session, &long, &long)).await.unwrap();
        }
        let buf = buffer(store, Arc::new(MemoryCache::new()));

        let window = buf.load_window(session, "next", Language::Es).await.unwrap();
        let config = MemoryConfig::default();
        assert!(window.estimated_tokens <= config.max_tokens);
        assert!(window.estimated_tokens <= (config.max_tokens as f32 * 0.9) as i32 + 64);
        assert!(window.recent_turn_count() <= config.max_short_term_turns);
        let summary = window.session_summary.unwrap();
        assert!(summary.contains("comprimidos"));
    }

    #[tokio::test]
    async fn test_plan_params_recovered_from_metadata() {
        let store = Arc::new(MemoryConversationStore::new());
        let session = SessionId::now_v7();
        store
            .append_turn(&turn(session, "2 personas, 2 horas", "ok").with_metadata(json!({
                "plan_params": {"num_people": 2, "duration": "2 hours"}
            })))
            .await
            .unwrap();
        store
            .append_turn(&turn(session, "Zaragoza", "ok").with_metadata(json!({
                "plan_params": {"num_people": 2, "duration": "2 hours", "cities": ["Zaragoza"]}
            })))
            .await
            .unwrap();

        let buf = buffer(store, Arc::new(MemoryCache::new()));
        let window = buf.load_window(session, "bares", Language::Es).await.unwrap();
        assert_eq!(window.plan_params.num_people, Some(2));
        assert_eq!(window.plan_params.duration.as_deref(), Some("2 hours"));
        assert_eq!(window.plan_params.cities, vec!["Zaragoza"]);
    }

    #[test]
    fn test_estimate_just_over_threshold_folds_one_message() {
        let session = SessionId::now_v7();
        let config = MemoryConfig::default();
        // 10 turns x 2 messages x 641 chars = 3205 estimated tokens, one
        // past the 0.8 x 4000 threshold
        let text = "x".repeat(641);
        let turns: Vec<ConversationTurn> =
            (0..10).map(|_| turn(session, &text, &text)).collect();

        let window = build_window(&turns, &config, Language::Es);
        assert_eq!(window.recent.len(), 19);
        assert!(window.session_summary.unwrap().contains("comprimidos"));
        assert!(window.estimated_tokens <= (config.max_tokens as f32 * 0.9) as i32 + 16);
        assert!(window.estimated_tokens <= config.max_tokens);
    }

    #[tokio::test]
    async fn test_cache_hit_returns_stored_window() {
        let store = Arc::new(MemoryConversationStore::new());
        let cache = Arc::new(MemoryCache::new());
        let session = SessionId::now_v7();
        let config = MemoryConfig::default();

        let sentinel = MemoryWindow {
            recent: vec![],
            previous_places: vec![],
            session_summary: Some("sentinel".to_string()),
            total_turns: 99,
            estimated_tokens: 3,
            plan_params: PlanState::default(),
        };
        let key = memory_key(session, &config.fingerprint());
        cache
            .set(&key, &serde_json::to_string(&sentinel).unwrap(), Duration::from_secs(60))
            .await
            .unwrap();

        let buf = buffer(store, cache);
        let window = buf.load_window(session, "q", Language::Es).await.unwrap();
        assert_eq!(window, sentinel);
    }

    #[tokio::test]
    async fn test_read_after_write_through_invalidation() {
        let store = Arc::new(MemoryConversationStore::new());
        let cache = Arc::new(MemoryCache::new());
        let session = SessionId::now_v7();
        let buf = buffer(store.clone(), cache);

        store.append_turn(&turn(session, "first", "r1")).await.unwrap();
        let window = buf.load_window(session, "q", Language::Es).await.unwrap();
        assert_eq!(window.total_turns, 1);

        // Append + invalidate, as the orchestrator does
        store.append_turn(&turn(session, "second", "r2")).await.unwrap();
        buf.invalidate(session).await;

        let window = buf.load_window(session, "q", Language::Es).await.unwrap();
        assert_eq!(window.total_turns, 2);
        assert_eq!(window.recent.last().unwrap().text, "r2");
    }

    #[tokio::test]
    async fn test_stale_window_served_until_invalidated() {
        let store = Arc::new(MemoryConversationStore::new());
        let cache = Arc::new(MemoryCache::new());
        let session = SessionId::now_v7();
        let buf = buffer(store.clone(), cache);

        store.append_turn(&turn(session, "first", "r1")).await.unwrap();
        let _ = buf.load_window(session, "q", Language::Es).await.unwrap();

        // A write from another process without invalidation: readers may
        // briefly see the stale window
        store.append_turn(&turn(session, "second", "r2")).await.unwrap();
        let stale = buf.load_window(session, "q", Language::Es).await.unwrap();
        assert_eq!(stale.total_turns, 1);
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl ConversationStore for FailingStore {
        async fn append_turn(&self, _turn: &ConversationTurn) -> AgentResult<()> {
            Err(StorageError::WriteFailed { entity: "conversation_turn", reason: "down".into() }.into())
        }

        async fn session_history(
            &self,
            _session_id: SessionId,
            _limit: usize,
        ) -> AgentResult<Vec<ConversationTurn>> {
            Err(StorageError::ReadFailed { entity: "conversation_turn", reason: "down".into() }.into())
        }
    }

    struct FailingCache;

    #[async_trait::async_trait]
    impl CacheBackend for FailingCache {
        async fn get(&self, _key: &str) -> AgentResult<Option<String>> {
            Err(rambla_core::CacheError::Backend { reason: "down".into() }.into())
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> AgentResult<()> {
            Err(rambla_core::CacheError::Backend { reason: "down".into() }.into())
        }
        async fn delete(&self, _key: &str) -> AgentResult<bool> {
            Err(rambla_core::CacheError::Backend { reason: "down".into() }.into())
        }
        async fn delete_pattern(&self, _pattern: &str) -> AgentResult<u64> {
            Err(rambla_core::CacheError::Backend { reason: "down".into() }.into())
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_hard_error() {
        let buf = buffer(Arc::new(FailingStore), Arc::new(MemoryCache::new()));
        let err = buf.load_window(SessionId::now_v7(), "q", Language::Es).await.unwrap_err();
        assert_eq!(err.kind(), rambla_core::ErrorKind::MemoryUnavailable);
    }

    #[tokio::test]
    async fn test_cache_failure_is_swallowed() {
        let store = Arc::new(MemoryConversationStore::new());
        let session = SessionId::now_v7();
        store.append_turn(&turn(session, "q1", "r1")).await.unwrap();

        let buf = buffer(store, Arc::new(FailingCache));
        let window = buf.load_window(session, "q", Language::Es).await.unwrap();
        assert_eq!(window.total_turns, 1);

        // Invalidation against a dead cache must not panic or error
        buf.invalidate(session).await;
    }
}
