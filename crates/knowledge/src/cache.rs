use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Resolved concept summaries, so a concept that shows up in many sentences
/// is looked up once per run.
#[derive(Clone)]
pub struct SummaryCache {
    summaries: Arc<DashMap<String, String>>,
    max_entries: usize,
}

impl SummaryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            summaries: Arc::new(DashMap::new()),
            max_entries,
        }
    }

    pub fn insert(&self, concept: &str, summary: String) {
        if self.max_entries == 0 {
            return;
        }
        if self.summaries.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self
                .summaries
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.summaries.remove(&key);
            }
        }
        let key = self.hash_concept(concept);
        self.summaries.insert(key, summary);
    }

    pub fn get(&self, concept: &str) -> Option<String> {
        let key = self.hash_concept(concept);
        self.summaries.get(&key).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// Case and surrounding whitespace do not make a different concept.
    fn hash_concept(&self, concept: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(concept.trim().to_lowercase().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case_and_padding() {
        let cache = SummaryCache::new(10);
        cache.insert("Aspirin", "A salicylate.".to_string());

        assert_eq!(cache.get("  aspirin "), Some("A salicylate.".to_string()));
        assert_eq!(cache.get("ibuprofen"), None);
    }

    #[test]
    fn test_eviction_keeps_size_bounded() {
        let cache = SummaryCache::new(4);
        for i in 0..10 {
            cache.insert(&format!("concept {}", i), format!("summary {}", i));
        }

        assert!(cache.len() <= 4);
        assert_eq!(cache.get("concept 9"), Some("summary 9".to_string()));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = SummaryCache::new(0);
        cache.insert("Aspirin", "A salicylate.".to_string());

        assert!(cache.is_empty());
    }
}
