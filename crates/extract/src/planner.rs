use anyhow::{Context, Result};

use crate::llm::ChatModel;
use crate::prompt::PromptBuilder;
use crate::schema::ConceptLists;

const UNFAMILIAR_MARKER: &str = "Truly Unfamiliar Concepts";
const AMBIGUOUS_MARKER: &str = "Ambiguous Concepts";

/// Planning stage: one LLM call that decides which concepts need outside help.
pub struct ConceptPlanner<'a, M: ChatModel + ?Sized> {
    llm: &'a M,
    prompts: &'a PromptBuilder,
}

impl<'a, M: ChatModel + ?Sized> ConceptPlanner<'a, M> {
    pub fn new(llm: &'a M, prompts: &'a PromptBuilder) -> Self {
        Self { llm, prompts }
    }

    pub async fn plan(&self, sentence: &str) -> Result<ConceptLists> {
        let prompt = self.prompts.planner(sentence);
        let answer = self
            .llm
            .complete(&prompt)
            .await
            .context("Planner call failed")?;

        Ok(parse_concepts(&answer))
    }
}

/// Parse the planner answer into the two concept lists.
///
/// A marker line contributes the text after its first colon, split on `#`.
/// "None" parses to an empty list; a missing marker does too. A later marker
/// line overrides an earlier one.
pub fn parse_concepts(answer: &str) -> ConceptLists {
    let mut lists = ConceptLists::default();

    for line in answer.lines() {
        if let Some(items) = marker_items(line, UNFAMILIAR_MARKER, AMBIGUOUS_MARKER) {
            lists.unfamiliar = items;
        }
        if let Some(items) = marker_items(line, AMBIGUOUS_MARKER, UNFAMILIAR_MARKER) {
            lists.ambiguous = items;
        }
    }

    lists
}

fn marker_items(line: &str, marker: &str, other: &str) -> Option<Vec<String>> {
    let start = line.find(marker)? + marker.len();
    let rest = &line[start..];

    // Both markers on one line: stop at the other one
    let segment = match rest.find(other) {
        Some(end) => &rest[..end],
        None => rest,
    };

    let Some((_, items)) = segment.split_once(':') else {
        return Some(Vec::new());
    };

    Some(
        items
            .split('#')
            .map(clean_item)
            .filter(|item| !item.is_empty() && !is_none(item))
            .map(str::to_string)
            .collect(),
    )
}

fn clean_item(item: &str) -> &str {
    item.trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '"' | '`'))
}

fn is_none(item: &str) -> bool {
    item.trim_end_matches('.').eq_ignore_ascii_case("none")
}
