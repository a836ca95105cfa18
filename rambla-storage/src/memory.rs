//! In-memory adapters for the persistence ports.
//!
//! These back tests and single-process deployments. They uphold the same
//! contracts the production adapters must: serialized turn appends with
//! monotonic `created_at` per session, upsert-with-increment metrics, and
//! TTL-expiring cache entries with trailing-wildcard pattern delete.

use crate::ports::{
    CacheBackend, CacheStats, ConversationStore, MetricsBucket, MetricsStore, MetricsUpdate,
    PreferenceStore,
};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rambla_core::{
    AgentResult, ConversationTurn, SessionId, StorageError, Timestamp, UserPreferences,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

// ============================================================================
// CONVERSATION STORE
// ============================================================================

/// In-memory conversation store backed by a per-session vector.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    sessions: RwLock<HashMap<SessionId, Vec<ConversationTurn>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total turns across all sessions; test helper.
    pub fn turn_count(&self) -> usize {
        self.sessions
            .read()
            .map(|s| s.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append_turn(&self, turn: &ConversationTurn) -> AgentResult<()> {
        let mut sessions = self.sessions.write().map_err(|_| StorageError::WriteFailed {
            entity: "conversation_turn",
            reason: "store lock poisoned".to_string(),
        })?;

        let turns = sessions.entry(turn.session_id).or_default();
        let mut stored = turn.clone();
        // Appends are serialized here; keep created_at monotonically
        // non-decreasing within the session even under clock skew.
        if let Some(last) = turns.last() {
            if stored.created_at <= last.created_at {
                stored.created_at = last.created_at + ChronoDuration::microseconds(1);
            }
        }
        turns.push(stored);
        Ok(())
    }

    async fn session_history(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> AgentResult<Vec<ConversationTurn>> {
        let sessions = self.sessions.read().map_err(|_| StorageError::ReadFailed {
            entity: "conversation_turn",
            reason: "store lock poisoned".to_string(),
        })?;

        let turns = sessions.get(&session_id).map(Vec::as_slice).unwrap_or(&[]);
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }
}

// ============================================================================
// PREFERENCE STORE
// ============================================================================

/// In-memory user preference store with upsert semantics.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    preferences: RwLock<HashMap<String, UserPreferences>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, user_id: &str) -> AgentResult<Option<UserPreferences>> {
        let preferences = self.preferences.read().map_err(|_| StorageError::ReadFailed {
            entity: "user_preferences",
            reason: "store lock poisoned".to_string(),
        })?;
        Ok(preferences.get(user_id).cloned())
    }

    async fn upsert(&self, prefs: &UserPreferences) -> AgentResult<()> {
        let mut preferences = self.preferences.write().map_err(|_| StorageError::WriteFailed {
            entity: "user_preferences",
            reason: "store lock poisoned".to_string(),
        })?;
        let mut stored = prefs.clone();
        stored.updated_at = Utc::now();
        preferences.insert(stored.user_id.clone(), stored);
        Ok(())
    }
}

// ============================================================================
// METRICS STORE
// ============================================================================

/// In-memory hourly metrics aggregates keyed by (bucket_hour, model).
#[derive(Debug, Default)]
pub struct MemoryMetricsStore {
    buckets: RwLock<HashMap<(Timestamp, String), MetricsBucket>>,
}

impl MemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricsStore for MemoryMetricsStore {
    async fn record(
        &self,
        bucket_hour: Timestamp,
        model: &str,
        update: MetricsUpdate,
    ) -> AgentResult<()> {
        let mut buckets = self.buckets.write().map_err(|_| StorageError::WriteFailed {
            entity: "agent_metrics",
            reason: "store lock poisoned".to_string(),
        })?;

        let bucket = buckets
            .entry((bucket_hour, model.to_string()))
            .or_insert_with(|| MetricsBucket {
                bucket_hour,
                model: model.to_string(),
                queries: 0,
                success: 0,
                failure: 0,
                total_tokens: 0,
                total_cost_usd: 0.0,
                avg_duration_ms: 0,
            });

        // Read-modify-write under the store's lock; the running average is
        // recomputed from the previous count so increments never lose data.
        let prev_total = bucket.avg_duration_ms * bucket.queries;
        bucket.queries += 1;
        if update.success {
            bucket.success += 1;
        } else {
            bucket.failure += 1;
        }
        bucket.total_tokens += update.tokens;
        bucket.total_cost_usd += update.cost_usd;
        bucket.avg_duration_ms = (prev_total + update.duration_ms) / bucket.queries;
        Ok(())
    }

    async fn bucket(
        &self,
        bucket_hour: Timestamp,
        model: &str,
    ) -> AgentResult<Option<MetricsBucket>> {
        let buckets = self.buckets.read().map_err(|_| StorageError::ReadFailed {
            entity: "agent_metrics",
            reason: "store lock poisoned".to_string(),
        })?;
        Ok(buckets.get(&(bucket_hour, model.to_string())).cloned())
    }
}

// ============================================================================
// CACHE
// ============================================================================

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Timestamp,
}

/// In-memory cache with TTL expiry, checked lazily on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.read().map(|e| e.len() as u64).unwrap_or(0),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> AgentResult<Option<String>> {
        let now = Utc::now();
        let expired = {
            let entries = self.entries.read().map_err(lock_poisoned)?;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = self.entries.write().map_err(lock_poisoned)?;
            // Re-check under the write lock; a concurrent set may have
            // refreshed the entry.
            if entries.get(key).is_some_and(|e| e.expires_at <= now) {
                entries.remove(key);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AgentResult<()> {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(3650));
        let mut entries = self.entries.write().map_err(lock_poisoned)?;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Utc::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AgentResult<bool> {
        let mut entries = self.entries.write().map_err(lock_poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> AgentResult<u64> {
        let mut entries = self.entries.write().map_err(lock_poisoned)?;
        let before = entries.len();
        match pattern.strip_suffix('*') {
            Some(prefix) => entries.retain(|key, _| !key.starts_with(prefix)),
            None => {
                entries.remove(pattern);
            }
        }
        Ok((before - entries.len()) as u64)
    }
}

fn lock_poisoned<T>(_: T) -> rambla_core::AgentError {
    rambla_core::CacheError::Backend { reason: "cache lock poisoned".to_string() }.into()
}

// ============================================================================
// TESTS
// ============================================================================
