//! Cache key namespaces.
//!
//! Every cached value lives under an `agent:` prefix with one namespace per
//! concern, so pattern invalidation can target a session without touching
//! classifier or places entries.

use rambla_core::SessionId;

/// Key for a session's cached memory window. The config fingerprint keeps
/// windows built under old sizing limits from being served after a config
/// change.
pub fn memory_key(session_id: SessionId, config_fingerprint: &str) -> String {
    format!("agent:memory:{}:{}", session_id, config_fingerprint)
}

/// Pattern matching every memory entry for a session, regardless of config
/// fingerprint. Used by post-write invalidation.
pub fn memory_key_pattern(session_id: SessionId) -> String {
    format!("agent:memory:{}*", session_id)
}

/// Key for a cached intent decision.
pub fn intent_key(hash: &str) -> String {
    format!("agent:intent:{}", hash)
}

/// Key for a cached places lookup.
pub fn places_key(hash: &str) -> String {
    format!("agent:places:{}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rambla_core::EntityIdType;

    #[test]
    fn test_memory_key_matches_own_pattern() {
        let session = SessionId::now_v7();
        let key = memory_key(session, "abc123");
        let pattern = memory_key_pattern(session);
        let prefix = pattern.strip_suffix('*').unwrap();
        assert!(key.starts_with(prefix));
    }

    #[test]
    fn test_namespaces_are_disjoint() {
        let session = SessionId::now_v7();
        let memory = memory_key(session, "f");
        let intent = intent_key("deadbeef");
        let places = places_key("deadbeef");
        assert!(memory.starts_with("agent:memory:"));
        assert!(intent.starts_with("agent:intent:"));
        assert!(places.starts_with("agent:places:"));
        assert_ne!(intent, places);
    }
}
