use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
        }
    }
}

/// Structured answer of the extraction and reflection stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub sentence: String,
    pub entities: Vec<Entity>,
}

impl ExtractionResult {
    /// The degraded answer used once the attempt budget is spent.
    pub fn fallback(sentence: &str) -> Self {
        Self {
            sentence: sentence.to_string(),
            entities: Vec::new(),
        }
    }
}

/// Concepts the planner flagged for the knowledge stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptLists {
    pub unfamiliar: Vec<String>,
    pub ambiguous: Vec<String>,
}

impl ConceptLists {
    pub fn is_empty(&self) -> bool {
        self.unfamiliar.is_empty() && self.ambiguous.is_empty()
    }
}
