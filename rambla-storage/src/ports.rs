//! Abstract persistence ports.
//!
//! All cross-request continuity flows through these traits. Implementations
//! must be thread-safe; the engine shares them across worker tasks behind
//! `Arc`.

use async_trait::async_trait;
use rambla_core::{AgentResult, ConversationTurn, SessionId, Timestamp, UserPreferences};
use std::time::Duration;

// ============================================================================
// DURABLE STORE PORTS
// ============================================================================

/// Durable store for conversation turns. The single source of truth for
/// session history; within a session, appends are serialized by the store
/// and readers observe them in write order.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a turn. Turns are append-only; there is no update.
    async fn append_turn(&self, turn: &ConversationTurn) -> AgentResult<()>;

    /// The most recent `limit` turns for a session, in chronological order
    /// (oldest of the slice first).
    async fn session_history(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> AgentResult<Vec<ConversationTurn>>;
}

/// Durable store for per-user preferences. Upsert semantics, one row per
/// user id.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, user_id: &str) -> AgentResult<Option<UserPreferences>>;

    async fn upsert(&self, preferences: &UserPreferences) -> AgentResult<()>;
}

/// One query's contribution to an hourly metrics bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsUpdate {
    pub success: bool,
    pub tokens: i64,
    pub cost_usd: f64,
    pub duration_ms: i64,
}

/// Aggregated metrics for one (hour, model) bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsBucket {
    pub bucket_hour: Timestamp,
    pub model: String,
    pub queries: i64,
    pub success: i64,
    pub failure: i64,
    pub total_tokens: i64,
    pub total_cost_usd: f64,
    pub avg_duration_ms: i64,
}

/// Durable store for aggregated metrics. Implementations must use
/// upsert-with-increment (or an equivalent read-modify-write under the
/// store's serialization) so concurrent workers never lose updates.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Fold one query's metrics into the (bucket_hour, model) row.
    async fn record(
        &self,
        bucket_hour: Timestamp,
        model: &str,
        update: MetricsUpdate,
    ) -> AgentResult<()>;

    /// Read a bucket back, if it exists.
    async fn bucket(
        &self,
        bucket_hour: Timestamp,
        model: &str,
    ) -> AgentResult<Option<MetricsBucket>>;
}

// ============================================================================
// CACHE PORT
// ============================================================================

/// Volatile key/value cache with TTL and pattern delete. Values are JSON
/// strings; callers own serialization. Cached values are eventually
/// consistent shadows of the durable store - cache failures must never
/// fail a request.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value, or None on miss or expiry.
    async fn get(&self, key: &str) -> AgentResult<Option<String>>;

    /// Store a value under `key` for `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AgentResult<()>;

    /// Delete a key. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> AgentResult<bool>;

    /// Delete all keys matching a pattern. Only a trailing `*` wildcard is
    /// supported, which is all the engine's invalidation protocol needs.
    /// Returns the number of entries removed.
    async fn delete_pattern(&self, pattern: &str) -> AgentResult<u64>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
}

impl CacheStats {
    /// Hit rate in [0.0, 1.0].
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats { hits: 80, misses: 20, ..Default::default() };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty = CacheStats::default();
        assert!((empty.hit_rate() - 0.0).abs() < 0.001);
    }
}
