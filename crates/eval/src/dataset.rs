use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use extract::{DatasetResources, Entity};

/// Annotated entity of the benchmark file. Offsets, ids and any other
/// per-entity fields are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GoldEntity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            extra: Map::new(),
        }
    }
}

/// One sentence of the benchmark file with its gold and predicted entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceRecord {
    pub sentence: String,
    pub entities: Vec<GoldEntity>,
    #[serde(default)]
    pub predicts: Vec<Entity>,
    /// Any other top-level field of the input, written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SentenceRecord {
    pub fn new(sentence: impl Into<String>, entities: Vec<GoldEntity>) -> Self {
        Self {
            sentence: sentence.into(),
            entities,
            predicts: Vec::new(),
            extra: Map::new(),
        }
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

pub async fn load_dataset(path: impl AsRef<Path>) -> Result<Vec<SentenceRecord>> {
    read_json(path.as_ref()).await
}

/// Write the records as JSON indented by 8 spaces, creating the parent
/// directory when needed.
pub async fn save_dataset(path: impl AsRef<Path>, records: &[SentenceRecord]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"        ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    records
        .serialize(&mut serializer)
        .context("Failed to serialize predictions")?;

    tokio::fs::write(path, buffer)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Load labels, type definitions and few-shot examples of one dataset.
pub async fn load_resources(dir: impl AsRef<Path>) -> Result<DatasetResources> {
    let dir = dir.as_ref();
    let labels: Vec<String> = read_json(&dir.join("labels.json")).await?;
    let definitions: BTreeMap<String, Value> = read_json(&dir.join("define.json")).await?;
    let few_shot: Value = read_json(&dir.join("define_sample_min.json")).await?;

    Ok(DatasetResources {
        labels,
        definitions,
        few_shot,
    })
}

/// Keep only the first `limit` records. `None` keeps everything.
pub fn truncate_to_limit(records: &mut Vec<SentenceRecord>, limit: Option<usize>) {
    if let Some(limit) = limit {
        records.truncate(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = r#"[
        {"id": "227508", "sentence": "Aspirin reduces fever.",
         "entities": [{"name": "Aspirin", "type": "Chemical", "start": 0, "end": 7},
                      {"name": "fever", "type": "Disease", "start": 16, "end": 21}]},
        {"sentence": "Lithium-induced tremor.", "entities": []}
    ]"#;

    #[tokio::test]
    async fn test_round_trip_keeps_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("test.json");
        std::fs::write(&input, INPUT).unwrap();

        let mut records = load_dataset(&input).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].predicts.is_empty());
        assert_eq!(records[0].extra["id"], "227508");
        assert_eq!(records[0].entities[0].name, "Aspirin");
        assert_eq!(records[0].entities[0].extra["start"], 0);

        records[0].predicts = vec![Entity::new("Aspirin", "Chemical")];
        let output = dir.path().join("out").join("pred.json");
        save_dataset(&output, &records).await.unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("[\n        {"));
        assert!(text.contains("\"start\": 16"));
        assert!(text.contains("\"end\": 7"));

        let reloaded = load_dataset(&output).await.unwrap();
        assert_eq!(reloaded, records);
    }

    #[tokio::test]
    async fn test_load_resources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("labels.json"), r#"["Chemical", "Disease"]"#).unwrap();
        std::fs::write(
            dir.path().join("define.json"),
            r#"{"Chemical": "A drug or compound.", "Disease": "A disorder."}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("define_sample_min.json"), r#"[{"sentence": "..."}]"#).unwrap();

        let resources = load_resources(dir.path()).await.unwrap();

        assert_eq!(resources.labels, vec!["Chemical", "Disease"]);
        assert_eq!(resources.definitions.len(), 2);
        assert!(resources.few_shot.is_array());
    }

    #[tokio::test]
    async fn test_missing_resource_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("labels.json"), r#"["Chemical"]"#).unwrap();

        assert!(load_resources(dir.path()).await.is_err());
    }

    #[test]
    fn test_truncate_to_limit() {
        let mut records: Vec<SentenceRecord> = (0..5)
            .map(|i| SentenceRecord::new(format!("sentence {}", i), Vec::new()))
            .collect();

        truncate_to_limit(&mut records, None);
        assert_eq!(records.len(), 5);

        truncate_to_limit(&mut records, Some(1));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sentence, "sentence 0");

        truncate_to_limit(&mut records, Some(10));
        assert_eq!(records.len(), 1);
    }
}
