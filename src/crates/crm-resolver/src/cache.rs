//! Session-scoped resolver result cache (§4.E, §5: "per-coordinator-instance,
//! in-memory, LRU; not shared across processes").

use crm_domain::interrupt::ScoredCandidate;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

const CAPACITY: usize = 50;
const TTL: Duration = Duration::from_secs(60 * 60);

struct Entry {
    candidates: Vec<ScoredCandidate>,
    inserted_at: Instant,
}

/// One cache per session (`SessionId`). The coordinator owns a
/// `HashMap<SessionId, ResolverCache>` and hands the right one to each
/// resolver call; this type itself knows nothing about sessions.
pub struct ResolverCache {
    entries: LruCache<String, Entry>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self { entries: LruCache::new(NonZeroUsize::new(CAPACITY).unwrap()) }
    }

    fn normalize(query: &str) -> String {
        query.trim().to_lowercase()
    }

    pub fn get(&mut self, query: &str) -> Option<Vec<ScoredCandidate>> {
        let key = Self::normalize(query);
        let hit = self.entries.get(&key)?;
        if hit.inserted_at.elapsed() > TTL {
            self.entries.pop(&key);
            return None;
        }
        Some(hit.candidates.clone())
    }

    pub fn put(&mut self, query: &str, candidates: Vec<ScoredCandidate>) {
        let key = Self::normalize(query);
        self.entries.put(key, Entry { candidates, inserted_at: Instant::now() });
    }
}

impl Default for ResolverCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A registry of per-session caches, keyed by an opaque session id string so
/// this crate stays free of a `crm-domain` -> session lifecycle dependency
/// beyond the `SessionId` newtype itself.
#[derive(Default)]
pub struct SessionCaches {
    by_session: HashMap<String, ResolverCache>,
}

impl SessionCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_for(&mut self, session_id: &str) -> &mut ResolverCache {
        self.by_session.entry(session_id.to_string()).or_insert_with(ResolverCache::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_domain::{Candidate, EntityType};

    fn scored(id: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate {
                id: id.to_string(),
                entity_type: EntityType::Contact,
                name: "Jane".to_string(),
                role: None,
                company: None,
                email: None,
            },
            score,
        }
    }

    #[test]
    fn normalized_query_hits_cache() {
        let mut cache = ResolverCache::new();
        cache.put("  Jane  ", vec![scored("c-1", 90.0)]);
        assert!(cache.get("jane").is_some());
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let mut cache = ResolverCache::new();
        cache.entries.put("jane".to_string(), Entry { candidates: vec![scored("c-1", 90.0)], inserted_at: Instant::now() - TTL - Duration::from_secs(1) });
        assert!(cache.get("jane").is_none());
    }

    #[test]
    fn sessions_do_not_share_entries() {
        let mut caches = SessionCaches::new();
        caches.cache_for("s1").put("jane", vec![scored("c-1", 90.0)]);
        assert!(caches.cache_for("s2").get("jane").is_none());
    }
}
