use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::source::{KnowledgeSource, LookupError};

/// Wikipedia through the MediaWiki action API.
#[derive(Clone)]
pub struct WikipediaClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    query: Option<T>,
}

#[derive(Deserialize)]
struct ParseResponse {
    parse: Option<ParsedPage>,
}

#[derive(Deserialize)]
struct ParsedPage {
    #[serde(default)]
    wikitext: String,
}

#[derive(Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    extract: Option<String>,
    pageprops: Option<PageProps>,
}

#[derive(Debug, Deserialize)]
struct PageProps {
    disambiguation: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
    searchinfo: Option<SearchInfo>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize)]
struct SearchInfo {
    suggestion: Option<String>,
}

#[derive(Debug, PartialEq)]
enum PageState {
    Missing,
    Disambiguation(String),
    Summary(String),
}

impl WikipediaClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ner-reflect/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { base_url, client })
    }

    pub fn english(timeout: Duration) -> Result<Self> {
        Self::new("https://en.wikipedia.org/w/api.php".to_string(), timeout)
    }

    async fn get<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, LookupError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LookupError::Transport(format!(
                "Wikipedia request failed: {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    async fn query<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T, LookupError> {
        let mut all = vec![("action", "query")];
        all.extend_from_slice(params);

        let body: ApiResponse<T> = self.get(&all).await?;
        body.query
            .ok_or_else(|| LookupError::Transport("Wikipedia response has no query".to_string()))
    }

    /// Title the service suggests for `query`, else the best search hit.
    async fn suggest(&self, query: &str) -> Result<String, LookupError> {
        let result: SearchQuery = self
            .query(&[
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", "1"),
                ("srinfo", "suggestion"),
            ])
            .await?;

        result
            .searchinfo
            .and_then(|info| info.suggestion)
            .or_else(|| result.search.into_iter().next().map(|hit| hit.title))
            .ok_or_else(|| LookupError::NotFound {
                title: query.to_string(),
            })
    }

    /// Entries of a disambiguation page in the order the page lists them.
    async fn disambiguation_options(&self, title: &str) -> Result<Vec<String>, LookupError> {
        let body: ParseResponse = self
            .get(&[
                ("action", "parse"),
                ("page", title),
                ("prop", "wikitext"),
                ("redirects", "1"),
            ])
            .await?;

        let page = body
            .parse
            .ok_or_else(|| LookupError::Transport("Wikipedia response has no parse".to_string()))?;
        Ok(list_entry_titles(&page.wikitext))
    }
}

const SKIPPED_NAMESPACES: &[&str] = &[
    "file:",
    "image:",
    "category:",
    "wikt:",
    "wiktionary:",
    "help:",
    "template:",
    "wikipedia:",
];

/// Article titles linked from bulleted lines of `wikitext`, first link per
/// line, in document order without repeats.
fn list_entry_titles(wikitext: &str) -> Vec<String> {
    let mut titles: Vec<String> = Vec::new();

    for line in wikitext.lines() {
        if !line.trim_start().starts_with('*') {
            continue;
        }
        let Some(target) = first_link_target(line) else {
            continue;
        };
        let lowered = target.to_lowercase();
        if SKIPPED_NAMESPACES.iter().any(|ns| lowered.starts_with(ns)) {
            continue;
        }
        if !titles.iter().any(|t| t == target) {
            titles.push(target.to_string());
        }
    }

    titles
}

/// Page part of the first `[[target|label]]` link on `line`.
fn first_link_target(line: &str) -> Option<&str> {
    let start = line.find("[[")? + 2;
    let len = line[start..].find("]]")?;
    let inner = &line[start..start + len];
    let target = inner.split('|').next().unwrap_or(inner);
    let target = target.split('#').next().unwrap_or(target).trim();
    (!target.is_empty()).then_some(target)
}

fn page_state(page: &Page) -> PageState {
    if page.missing || page.invalid {
        return PageState::Missing;
    }
    if page
        .pageprops
        .as_ref()
        .is_some_and(|props| props.disambiguation.is_some())
    {
        return PageState::Disambiguation(page.title.clone());
    }
    match page.extract.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => PageState::Summary(text.to_string()),
        _ => PageState::Missing,
    }
}

#[async_trait]
impl KnowledgeSource for WikipediaClient {
    async fn summary(
        &self,
        title: &str,
        sentences: usize,
        auto_suggest: bool,
    ) -> Result<String, LookupError> {
        let title = if auto_suggest {
            self.suggest(title).await?
        } else {
            title.to_string()
        };

        let sentences = sentences.to_string();
        let result: PagesQuery = self
            .query(&[
                ("prop", "extracts|pageprops"),
                ("titles", title.as_str()),
                ("redirects", "1"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("exsentences", sentences.as_str()),
                ("ppprop", "disambiguation"),
            ])
            .await?;

        let state = result
            .pages
            .first()
            .map(page_state)
            .unwrap_or(PageState::Missing);

        match state {
            PageState::Summary(text) => Ok(text),
            PageState::Missing => Err(LookupError::NotFound { title }),
            PageState::Disambiguation(page_title) => {
                let options = self.disambiguation_options(&page_title).await?;
                Err(LookupError::Ambiguous {
                    title: page_title,
                    options,
                })
            }
        }
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>, LookupError> {
        let limit = limit.to_string();
        let result: SearchQuery = self
            .query(&[("list", "search"), ("srsearch", query), ("srlimit", limit.as_str())])
            .await?;

        Ok(result.search.into_iter().map(|hit| hit.title).collect())
    }
}
