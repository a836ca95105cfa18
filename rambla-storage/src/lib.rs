//! Rambla Storage - Persistence Ports and In-Memory Adapters
//!
//! Defines the abstract ports for the durable store (conversation turns,
//! user preferences, aggregated metrics) and the volatile cache, plus
//! in-memory adapters used by tests and local runs. The production Redis
//! and relational implementations live outside this workspace and plug in
//! behind the same traits.

pub mod keys;
mod memory;
mod ports;

pub use keys::{intent_key, memory_key, memory_key_pattern, places_key};
pub use memory::{MemoryCache, MemoryConversationStore, MemoryMetricsStore, MemoryPreferenceStore};
pub use ports::{
    CacheBackend, CacheStats, ConversationStore, MetricsBucket, MetricsStore, MetricsUpdate,
    PreferenceStore,
};
