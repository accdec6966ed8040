use serde_json::Value;

/// Runtime JSON type a schema field may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Sequence,
    Mapping,
    Number,
    Integer,
    Boolean,
    Null,
}

impl FieldType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::Text => value.is_string(),
            FieldType::Sequence => value.is_array(),
            FieldType::Mapping => value.is_object(),
            // Integers are numbers too
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Null => value.is_null(),
        }
    }
}

/// Required-field contract for a JSON record.
///
/// Every declared key must be present with a value whose type is one of the
/// accepted types. Keys the schema does not mention are ignored, so verbose
/// model answers still pass.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, Vec<FieldType>)>,
}

impl Schema {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn field(mut self, name: &str, accepted: &[FieldType]) -> Self {
        self.fields.push((name.to_string(), accepted.to_vec()));
        self
    }

    /// `{"sentence": text, "entities": sequence}`
    pub fn envelope() -> Self {
        Self::new()
            .field("sentence", &[FieldType::Text])
            .field("entities", &[FieldType::Sequence])
    }

    /// `{"name": text, "type": text}`
    pub fn entity() -> Self {
        Self::new()
            .field("name", &[FieldType::Text])
            .field("type", &[FieldType::Text])
    }

    /// Check a single record.
    pub fn validate_record(&self, item: &Value) -> bool {
        let Some(object) = item.as_object() else {
            return false;
        };

        self.fields.iter().all(|(key, accepted)| {
            object
                .get(key)
                .is_some_and(|value| accepted.iter().any(|t| t.matches(value)))
        })
    }

    /// Check a sequence of records. Anything other than an array fails, and a
    /// single bad element fails the whole sequence.
    pub fn validate(&self, data: &Value) -> bool {
        match data.as_array() {
            Some(items) => items.iter().all(|item| self.validate_record(item)),
            None => false,
        }
    }

    /// Same as [`Schema::validate`] for an entity list pulled out of a record.
    pub fn validate_sequence(&self, sequence: &Value) -> bool {
        self.validate(sequence)
    }

    /// Parse `text` as JSON first; unparseable text is simply invalid.
    pub fn validate_text(&self, text: &str) -> bool {
        match serde_json::from_str::<Value>(text) {
            Ok(data) => self.validate(&data),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_field_fails() {
        let schema = Schema::envelope();

        assert!(!schema.validate(&json!([{"sentence": "x"}])));
        assert!(!schema.validate(&json!([{"entities": []}])));
        assert!(!Schema::entity().validate(&json!([{"name": "Aspirin"}])));
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let schema = Schema::envelope();
        let data = json!([{
            "sentence": "Aspirin reduces fever.",
            "entities": [],
            "reasoning": "nothing to see",
            "confidence": 0.9
        }]);

        assert!(schema.validate(&data));
    }

    #[test]
    fn test_wrong_type_fails() {
        let schema = Schema::envelope();

        assert!(!schema.validate(&json!([{"sentence": 3, "entities": []}])));
        assert!(!schema.validate(&json!([{"sentence": "x", "entities": "Aspirin"}])));
    }

    #[test]
    fn test_non_sequence_input_fails() {
        let schema = Schema::envelope();

        assert!(!schema.validate(&json!({"sentence": "x", "entities": []})));
        assert!(!schema.validate(&json!(["not a record"])));
    }

    #[test]
    fn test_sequence_is_all_or_nothing() {
        let inner = Schema::entity();
        let good = json!([
            {"name": "Aspirin", "type": "Chemical"},
            {"name": "fever", "type": "Disease"}
        ]);
        let one_bad = json!([
            {"name": "Aspirin", "type": "Chemical"},
            {"name": "fever", "type": null}
        ]);

        assert!(inner.validate_sequence(&good));
        assert!(!inner.validate_sequence(&one_bad));
        assert!(inner.validate_sequence(&json!([])));
    }

    #[test]
    fn test_text_input() {
        let schema = Schema::entity();

        assert!(schema.validate_text(r#"[{"name": "a", "type": "b"}]"#));
        assert!(!schema.validate_text(r#"[{"name": "a", "type": "b""#));
    }

    #[test]
    fn test_number_accepts_integer() {
        let schema = Schema::new().field("score", &[FieldType::Number, FieldType::Text]);

        assert!(schema.validate(&json!([{"score": 1}])));
        assert!(schema.validate(&json!([{"score": 0.5}])));
        assert!(schema.validate(&json!([{"score": "high"}])));
        assert!(!schema.validate(&json!([{"score": true}])));
        assert!(!Schema::new().field("n", &[FieldType::Integer]).validate(&json!([{"n": 0.5}])));
    }
}
