//! Bounded retry loop that turns free-form model text into a validated
//! [`ExtractionResult`].
//!
//! Each attempt prompts the model once, repairs and parses the reply, then
//! checks it against the envelope schema and, only if that holds, every
//! entity against the inner schema. The first valid reply is accepted. When
//! the budget runs out the result is the empty fallback for the sentence, so
//! callers always get a structurally valid answer.

use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::ChatModel;
use crate::repair::{ParseError, parse_model_output};
use crate::schema::ExtractionResult;
use crate::validator::Schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Reflection,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extraction => write!(f, "extraction"),
            Stage::Reflection => write!(f, "reflection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Accepted,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub result: ExtractionResult,
    /// Model calls spent, including the accepted one.
    pub attempts: usize,
    pub status: StageStatus,
}

impl StageOutcome {
    pub fn is_accepted(&self) -> bool {
        self.status == StageStatus::Accepted
    }
}

/// Why one attempt did not produce an acceptable answer.
#[derive(Debug, Error)]
pub enum AttemptFailure {
    #[error("completion call failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("answer does not match the sentence/entities envelope")]
    Envelope,
    #[error("entity list has a record without a text name and type")]
    Entities,
    #[error("validated answer could not be read: {0}")]
    Shape(String),
}

#[derive(Default)]
struct RetryState {
    attempt_index: usize,
    last_raw_text: String,
    last_failure: Option<AttemptFailure>,
}

pub struct RetryingExtractor<'a, M: ChatModel + ?Sized> {
    llm: &'a M,
    max_attempts: usize,
    envelope: Schema,
    inner: Schema,
}

impl<'a, M: ChatModel + ?Sized> RetryingExtractor<'a, M> {
    pub fn new(llm: &'a M, max_attempts: usize) -> Self {
        Self {
            llm,
            max_attempts,
            envelope: Schema::envelope(),
            inner: Schema::entity(),
        }
    }

    /// Run the attempt loop for one stage. `build_prompt` is called once per
    /// attempt; `sentence` feeds the fallback.
    pub async fn run<F>(&self, stage: Stage, sentence: &str, build_prompt: F) -> StageOutcome
    where
        F: Fn() -> String,
    {
        let mut state = RetryState::default();

        while state.attempt_index < self.max_attempts {
            let prompt = build_prompt();

            match self.attempt(&prompt, &mut state).await {
                Ok(result) => {
                    let attempts = state.attempt_index + 1;
                    if attempts > 1 {
                        info!(%stage, attempts, "Answer accepted after retries");
                    } else {
                        debug!(%stage, "Answer accepted on first attempt");
                    }
                    return StageOutcome {
                        result,
                        attempts,
                        status: StageStatus::Accepted,
                    };
                }
                Err(failure) => {
                    debug!(
                        %stage,
                        attempt = state.attempt_index + 1,
                        max_attempts = self.max_attempts,
                        error = %failure,
                        "Attempt rejected"
                    );
                    state.last_failure = Some(failure);
                    state.attempt_index += 1;
                }
            }
        }

        warn!(
            %stage,
            attempts = state.attempt_index,
            last_error = %state.last_failure.as_ref().map(|f| f.to_string()).unwrap_or_default(),
            last_answer = %preview(&state.last_raw_text),
            "Attempt budget exhausted, falling back to an empty entity list"
        );

        StageOutcome {
            result: ExtractionResult::fallback(sentence),
            attempts: state.attempt_index,
            status: StageStatus::Exhausted,
        }
    }

    async fn attempt(
        &self,
        prompt: &str,
        state: &mut RetryState,
    ) -> Result<ExtractionResult, AttemptFailure> {
        let raw = self
            .llm
            .complete(prompt)
            .await
            .map_err(|e| AttemptFailure::Transport(format!("{:#}", e)))?;

        state.last_raw_text = raw;
        self.check(&state.last_raw_text)
    }

    /// Repair, parse and validate one raw answer.
    pub fn check(&self, raw: &str) -> Result<ExtractionResult, AttemptFailure> {
        let candidate = parse_model_output(raw)?;

        if !self.envelope.validate(&Value::Array(vec![candidate.clone()])) {
            return Err(AttemptFailure::Envelope);
        }
        if !self.inner.validate_sequence(&candidate["entities"]) {
            return Err(AttemptFailure::Entities);
        }

        serde_json::from_value(candidate).map_err(|e| AttemptFailure::Shape(e.to_string()))
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() <= LIMIT {
        return text.to_string();
    }
    let cut: String = text.chars().take(LIMIT).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModel;
    use crate::schema::Entity;

    const SENTENCE: &str = "Aspirin reduces fever.";
    const VALID: &str = r#"{"sentence":"Aspirin reduces fever.","entities":[{"name":"Aspirin","type":"Chemical"}]}"#;

    fn prompt() -> String {
        "extract".to_string()
    }

    #[tokio::test]
    async fn test_all_invalid_falls_back_after_budget() {
        let model = ScriptedModel::new()
            .reply("not json at all")
            .reply(r#"{"sentence": "x"}"#)
            .reply(r#"{"sentence": "x", "entities": [{"name": "Aspirin"}]}"#);
        let extractor = RetryingExtractor::new(&model, 3);

        let outcome = extractor.run(Stage::Extraction, SENTENCE, prompt).await;

        assert_eq!(outcome.result, ExtractionResult::fallback(SENTENCE));
        assert_eq!(outcome.status, StageStatus::Exhausted);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_first_valid_reply_stops_the_loop() {
        for k in 0..4 {
            let mut model = ScriptedModel::new();
            for _ in 0..k {
                model = model.reply("{{{ broken");
            }
            model = model.reply(VALID).reply(VALID);
            let extractor = RetryingExtractor::new(&model, 5);

            let outcome = extractor.run(Stage::Reflection, SENTENCE, prompt).await;

            assert!(outcome.is_accepted());
            assert_eq!(outcome.result.entities, vec![Entity::new("Aspirin", "Chemical")]);
            assert_eq!(outcome.attempts, k + 1);
            assert_eq!(model.calls(), k + 1);
        }
    }

    #[tokio::test]
    async fn test_transport_failure_uses_an_attempt() {
        let model = ScriptedModel::new().fail("timed out").reply(VALID);
        let extractor = RetryingExtractor::new(&model, 2);

        let outcome = extractor.run(Stage::Extraction, SENTENCE, prompt).await;

        assert!(outcome.is_accepted());
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_zero_budget_makes_no_call() {
        let model = ScriptedModel::new().reply(VALID);
        let extractor = RetryingExtractor::new(&model, 0);

        let outcome = extractor.run(Stage::Extraction, SENTENCE, prompt).await;

        assert_eq!(outcome.status, StageStatus::Exhausted);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_prompt_rebuilt_identically_each_attempt() {
        let model = ScriptedModel::new().reply("nope").reply("nope");
        let extractor = RetryingExtractor::new(&model, 2);

        extractor
            .run(Stage::Extraction, SENTENCE, || format!("prompt for {}", SENTENCE))
            .await;

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0], prompts[1]);
    }

    #[tokio::test]
    async fn test_reasoning_before_answer_is_accepted() {
        let reply = format!(
            "1. Boundary check: {{\"name\": \"Aspirin\", \"type\": \"Chemical\"}} is correct.\n\nFinal corrected result:\n{}",
            VALID
        );
        let model = ScriptedModel::new().reply(reply.clone()).reply(reply.clone()).reply(reply);
        let extractor = RetryingExtractor::new(&model, 3);

        let outcome = extractor.run(Stage::Reflection, SENTENCE, prompt).await;

        assert!(outcome.is_accepted());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.result.entities, vec![Entity::new("Aspirin", "Chemical")]);
    }

    #[test]
    fn test_check_classifies_failures() {
        let model = ScriptedModel::new();
        let extractor = RetryingExtractor::new(&model, 1);

        assert!(matches!(extractor.check("no json"), Err(AttemptFailure::Parse(_))));
        assert!(matches!(
            extractor.check(r#"{"entities": []}"#),
            Err(AttemptFailure::Envelope)
        ));
        assert!(matches!(
            extractor.check(r#"{"sentence": "x", "entities": [{"name": 1, "type": "t"}]}"#),
            Err(AttemptFailure::Entities)
        ));
        assert!(matches!(
            extractor.check(r#"[{"sentence": "x", "entities": []}]"#),
            Err(AttemptFailure::Envelope)
        ));
    }

    #[test]
    fn test_check_repairs_and_keeps_extra_fields_out() {
        let model = ScriptedModel::new();
        let extractor = RetryingExtractor::new(&model, 1);
        let raw = "```json\n{'sentence': 'x', 'entities': [{'name': 'lithium', 'type': 'Chemical', 'span': [0, 7]},], 'notes': 'ok'}\n```";

        let result = extractor.check(raw).unwrap();

        assert_eq!(result.sentence, "x");
        assert_eq!(result.entities, vec![Entity::new("lithium", "Chemical")]);
    }
}
