use async_trait::async_trait;
use thiserror::Error;

/// Failure signals of a knowledge lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The title names several pages; `options` lists candidate titles.
    #[error("\"{title}\" may refer to several pages")]
    Ambiguous { title: String, options: Vec<String> },
    #[error("no page matches \"{title}\"")]
    NotFound { title: String },
    #[error("knowledge lookup failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        LookupError::Transport(e.to_string())
    }
}

/// An encyclopedia-like service that returns short summaries by title.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Summary of the page called `title`, cut to `sentences` sentences.
    /// With `auto_suggest` the service may correct the title first.
    async fn summary(
        &self,
        title: &str,
        sentences: usize,
        auto_suggest: bool,
    ) -> Result<String, LookupError>;

    /// Up to `limit` page titles matching `query`, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, LookupError>;
}
