use tracing::{debug, info, warn};

use crate::cache::SummaryCache;
use crate::source::{KnowledgeSource, LookupError};

/// Outcome of resolving one concept with the placeholder policy applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub concept: String,
    pub summary: String,
    pub found: bool,
}

/// Text used in place of a summary that could not be found.
pub fn placeholder(concept: &str) -> String {
    format!("[NO RESULT] {}", concept)
}

/// Concept name -> short summary, with disambiguation and search fallback.
pub struct KnowledgeResolver<S: KnowledgeSource> {
    source: S,
    sentences: usize,
    max_candidates: usize,
    cache: Option<SummaryCache>,
}

impl<S: KnowledgeSource> KnowledgeResolver<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            sentences: 2,
            max_candidates: 5,
            cache: None,
        }
    }

    pub fn with_limits(mut self, sentences: usize, max_candidates: usize) -> Self {
        self.sentences = sentences;
        self.max_candidates = max_candidates;
        self
    }

    pub fn with_cache(mut self, cache: SummaryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolve `concept`.
    ///
    /// 1. Fuzzy lookup with auto-suggest.
    /// 2. Ambiguous: try the first candidates the source offered, exact title.
    /// 3. Not found: search, then try the first hits, exact title.
    ///
    /// When no candidate works the error of step 1 is returned.
    pub async fn resolve(&self, concept: &str) -> Result<String, LookupError> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(concept)) {
            debug!(concept, "Knowledge cache hit");
            return Ok(hit);
        }

        let summary = self.lookup(concept).await?;

        if let Some(cache) = &self.cache {
            cache.insert(concept, summary.clone());
        }
        Ok(summary)
    }

    async fn lookup(&self, concept: &str) -> Result<String, LookupError> {
        let error = match self.source.summary(concept, self.sentences, true).await {
            Ok(summary) => return Ok(summary),
            Err(error) => error,
        };

        let candidates: Vec<String> = match &error {
            LookupError::Ambiguous { options, .. } => {
                options.iter().take(self.max_candidates).cloned().collect()
            }
            LookupError::NotFound { .. } => self
                .source
                .search(concept, self.max_candidates)
                .await?
                .into_iter()
                .take(self.max_candidates)
                .collect(),
            LookupError::Transport(_) => Vec::new(),
        };

        for candidate in &candidates {
            match self.source.summary(candidate, self.sentences, false).await {
                Ok(summary) => {
                    info!(concept, candidate = %candidate, "Resolved concept through a fallback title");
                    return Ok(summary);
                }
                Err(e) => {
                    debug!(concept, candidate = %candidate, error = %e, "Candidate title failed");
                }
            }
        }

        Err(error)
    }

    /// Resolve, substituting [`placeholder`] on failure so one unknown concept
    /// never blocks a sentence.
    pub async fn resolve_or_placeholder(&self, concept: &str) -> Resolution {
        match self.resolve(concept).await {
            Ok(summary) => Resolution {
                concept: concept.to_string(),
                summary,
                found: true,
            },
            Err(e) => {
                warn!(concept, error = %e, "No knowledge found for concept");
                Resolution {
                    concept: concept.to_string(),
                    summary: placeholder(concept),
                    found: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Page {
        Summary(&'static str),
        Ambiguous(Vec<&'static str>),
        Down,
    }

    #[derive(Default)]
    struct FakeWiki {
        pages: HashMap<&'static str, Page>,
        search: HashMap<&'static str, Vec<&'static str>>,
        summary_calls: Mutex<Vec<(String, bool)>>,
    }

    impl FakeWiki {
        fn page(mut self, title: &'static str, page: Page) -> Self {
            self.pages.insert(title, page);
            self
        }

        fn hits(mut self, query: &'static str, titles: Vec<&'static str>) -> Self {
            self.search.insert(query, titles);
            self
        }

        fn calls(&self) -> Vec<(String, bool)> {
            self.summary_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KnowledgeSource for FakeWiki {
        async fn summary(
            &self,
            title: &str,
            _sentences: usize,
            auto_suggest: bool,
        ) -> Result<String, LookupError> {
            self.summary_calls
                .lock()
                .unwrap()
                .push((title.to_string(), auto_suggest));

            match self.pages.get(title) {
                Some(Page::Summary(text)) => Ok(text.to_string()),
                Some(Page::Ambiguous(options)) => Err(LookupError::Ambiguous {
                    title: title.to_string(),
                    options: options.iter().map(|o| o.to_string()).collect(),
                }),
                Some(Page::Down) => Err(LookupError::Transport("connection reset".to_string())),
                None => Err(LookupError::NotFound {
                    title: title.to_string(),
                }),
            }
        }

        async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, LookupError> {
            Ok(self
                .search
                .get(query)
                .map(|titles| titles.iter().take(limit).map(|t| t.to_string()).collect())
                .unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_direct_hit() {
        let wiki = FakeWiki::default().page("Aspirin", Page::Summary("Aspirin is a salicylate."));
        let resolver = KnowledgeResolver::new(wiki);

        assert_eq!(resolver.resolve("Aspirin").await.unwrap(), "Aspirin is a salicylate.");
        assert_eq!(resolver.source.calls(), vec![("Aspirin".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_ambiguous_tries_candidates_in_order() {
        let wiki = FakeWiki::default()
            .page("Cold", Page::Ambiguous(vec!["c1", "c2"]))
            .page("c2", Page::Summary("The common cold is a viral infection."));
        let resolver = KnowledgeResolver::new(wiki);

        assert_eq!(
            resolver.resolve("Cold").await.unwrap(),
            "The common cold is a viral infection."
        );
        assert_eq!(
            resolver.source.calls(),
            vec![
                ("Cold".to_string(), true),
                ("c1".to_string(), false),
                ("c2".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn test_not_found_falls_back_to_search() {
        let wiki = FakeWiki::default()
            .hits("acetylsalicylic", vec!["Salicylic acid", "Aspirin"])
            .page("Salicylic acid", Page::Ambiguous(vec!["x"]))
            .page("Aspirin", Page::Summary("Aspirin is a salicylate."));
        let resolver = KnowledgeResolver::new(wiki);

        assert_eq!(
            resolver.resolve("acetylsalicylic").await.unwrap(),
            "Aspirin is a salicylate."
        );
    }

    #[tokio::test]
    async fn test_exhausted_chain_returns_original_error() {
        let wiki = FakeWiki::default()
            .page("Cold", Page::Ambiguous(vec!["c1", "c2"]))
            .page("c1", Page::Down);
        let resolver = KnowledgeResolver::new(wiki);

        let error = resolver.resolve("Cold").await.unwrap_err();
        assert_eq!(
            error,
            LookupError::Ambiguous {
                title: "Cold".to_string(),
                options: vec!["c1".to_string(), "c2".to_string()],
            }
        );

        let resolution = resolver.resolve_or_placeholder("Cold").await;
        assert!(!resolution.found);
        assert_eq!(resolution.summary, "[NO RESULT] Cold");
    }

    #[tokio::test]
    async fn test_no_search_hits_keeps_not_found() {
        let resolver = KnowledgeResolver::new(FakeWiki::default());

        assert!(matches!(
            resolver.resolve("Xyzzyquine").await,
            Err(LookupError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let wiki = FakeWiki::default().page("Aspirin", Page::Down);
        let resolver = KnowledgeResolver::new(wiki);

        assert!(matches!(
            resolver.resolve("Aspirin").await,
            Err(LookupError::Transport(_))
        ));
        assert_eq!(resolver.source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_candidate_limit() {
        let wiki = FakeWiki::default().page(
            "Culture",
            Page::Ambiguous(vec!["a", "b", "c", "d", "e", "f", "g"]),
        );
        let resolver = KnowledgeResolver::new(wiki).with_limits(2, 3);

        assert!(resolver.resolve("Culture").await.is_err());
        assert_eq!(resolver.source.calls().len(), 1 + 3);
    }

    #[tokio::test]
    async fn test_cache_avoids_second_lookup() {
        let wiki = FakeWiki::default().page("Aspirin", Page::Summary("Aspirin is a salicylate."));
        let resolver = KnowledgeResolver::new(wiki).with_cache(SummaryCache::new(16));

        resolver.resolve("Aspirin").await.unwrap();
        let again = resolver.resolve_or_placeholder("aspirin").await;

        assert!(again.found);
        assert_eq!(again.summary, "Aspirin is a salicylate.");
        assert_eq!(resolver.source.calls().len(), 1);
    }
}
