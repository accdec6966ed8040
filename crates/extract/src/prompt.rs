use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::schema::ExtractionResult;

/// Static per-dataset material the prompts are built from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetResources {
    /// Entity type labels, e.g. `["Chemical", "Disease"]`.
    pub labels: Vec<String>,
    /// Type name -> natural-language definition.
    pub definitions: BTreeMap<String, Value>,
    /// Few-shot examples, passed through as-is.
    pub few_shot: Value,
}

/// Knowledge gathered before extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeContext {
    /// Joined summaries of the unfamiliar concepts.
    pub unfamiliar: String,
    /// The disambiguation answer for the ambiguous concepts.
    pub disambiguation: String,
}

pub struct PromptBuilder {
    resources: DatasetResources,
}

const ANSWER_FORMAT: &str =
    r#"{"sentence": "", "entities": [{"name": "...", "type": "..."}, ...]}"#;

impl PromptBuilder {
    pub fn new(resources: DatasetResources) -> Self {
        Self { resources }
    }

    fn type_list(&self) -> String {
        self.resources
            .definitions
            .keys()
            .map(|t| format!("[{}]", t))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn definitions_block(&self) -> String {
        serde_json::to_string_pretty(&self.resources.definitions).unwrap_or_default()
    }

    /// Planning stage: pick concepts that need a lookup or disambiguation.
    pub fn planner(&self, sentence: &str) -> String {
        format!(
            r#"Please read the following text:
> [{}]

Your task is to identify entities of the following types: {}

Before that, list at most 5 nouns or proper nouns from the text that need further interpretation, in two groups:

Truly Unfamiliar Concepts: nouns whose meaning is not transparent even to a language model and that need an external knowledge source (Wikipedia, PubChem, UMLS) to resolve, such as rare chemicals, technical terms or domain jargon.

Ambiguous Concepts: familiar nouns with several real-world meanings that must be resolved from context (e.g. "Jaguar" as a car or an animal). Do not put obscure terms here.

Write "None" for a group with no concepts. Answer in exactly this format, separating items with #:

**Truly Unfamiliar Concepts**: concept1#concept2#...
**Ambiguous Concepts**: concept3#concept4#..."#,
            sentence,
            self.type_list()
        )
    }

    /// One call that explains every ambiguous concept in context.
    pub fn disambiguation(&self, sentence: &str, ambiguous: &[String]) -> String {
        let concepts = ambiguous
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Given the following sentence:

> {}

and these Ambiguous Concepts, common terms that can mean different things in different contexts (e.g. "Jaguar" as an animal or a car):

{}

For each concept, infer its most likely meaning in the context of the sentence and briefly explain why.

Answer in this format:

Concept: <concept>
Interpretation: <the most likely meaning and the reasoning behind it>
"#,
            sentence, concepts
        )
    }

    /// First-pass extraction with type definitions, few-shot examples and
    /// whatever knowledge the earlier stages produced.
    pub fn extraction(&self, sentence: &str, knowledge: &KnowledgeContext) -> String {
        let labels = serde_json::to_string(&self.resources.labels).unwrap_or_default();
        let few_shot = serde_json::to_string_pretty(&self.resources.few_shot).unwrap_or_default();

        let mut prompt = format!(
            r#"Please read the following text:
>[{}]

Your task is to infer the entities in the text with the entity category labels: {}.

Infer all entities in this sentence according to the entity category definitions below, and return the result in the following format:
{}

Please read the following relevant knowledge:

Entity types and their natural-language definitions:
{}

Auxiliary reasoning few-shot examples:
{}

"#,
            sentence,
            labels,
            ANSWER_FORMAT,
            self.definitions_block(),
            few_shot
        );

        if !knowledge.unfamiliar.is_empty() {
            prompt.push_str("Unfamiliar concepts retrieved from the knowledge base:\n");
            prompt.push_str(&knowledge.unfamiliar);
            prompt.push_str("\n\n");
        }

        if !knowledge.disambiguation.is_empty() {
            prompt.push_str("Ambiguous concepts interpreted in context:\n");
            prompt.push_str(&knowledge.disambiguation);
            prompt.push('\n');
        }

        prompt
    }

    /// Review pass over a previous structured answer. The sentence is passed
    /// separately because the answer's own `sentence` may be empty or altered.
    pub fn reflection(&self, sentence: &str, previous: &ExtractionResult) -> String {
        let entities = serde_json::to_string(&previous.entities).unwrap_or_default();

        format!(
            r#"You are an expert in Named Entity Recognition (NER). Verify and correct the NER result produced by a model, step by step.

Input Text:
>[{}]

Predicted Entities:
Entities: {}

Entity types and their definitions:
{}

Check the prediction against four criteria:
1. Are the entity boundaries accurate?
2. Are the entity types accurate?
3. Are both boundaries and types accurate?
4. Has any entity been missed?

Instructions:
1. Examine each predicted entity against the criteria and state which spans satisfy or violate each one.
2. Identify missing, spurious or mislabeled entities and explain the errors.
3. Revise the prediction so that it satisfies all four criteria.

Output the final corrected NER result in this fixed format:
{}"#,
            sentence,
            entities,
            self.definitions_block(),
            ANSWER_FORMAT
        )
    }
}
