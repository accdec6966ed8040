//! Per-sentence orchestration: plan, gather knowledge, extract, reflect.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use extract::{
    ChatModel, ConceptLists, ConceptPlanner, KnowledgeContext, PromptBuilder, RetryingExtractor,
    Stage, StageOutcome,
};
use knowledge::{KnowledgeResolver, KnowledgeSource};

use crate::config::ErrorPolicy;
use crate::dataset::SentenceRecord;
use crate::metrics::{PipelineMetrics, TimedOperation};

/// What happened to one sentence. Logged, never persisted.
#[derive(Debug, Clone)]
pub struct SentenceTrace {
    pub concepts: ConceptLists,
    /// Length in characters of the knowledge handed to extraction.
    pub knowledge_chars: usize,
    pub extraction: StageOutcome,
    pub reflection: StageOutcome,
    pub elapsed: Duration,
}

pub struct NerPipeline<M: ChatModel, S: KnowledgeSource> {
    llm: M,
    resolver: KnowledgeResolver<S>,
    prompts: PromptBuilder,
    max_attempts: usize,
    on_error: ErrorPolicy,
    metrics: Arc<PipelineMetrics>,
}

impl<M: ChatModel, S: KnowledgeSource> NerPipeline<M, S> {
    pub fn new(
        llm: M,
        resolver: KnowledgeResolver<S>,
        prompts: PromptBuilder,
        max_attempts: usize,
    ) -> Self {
        Self {
            llm,
            resolver,
            prompts,
            max_attempts,
            on_error: ErrorPolicy::default(),
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn with_error_policy(mut self, on_error: ErrorPolicy) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Process every record in order, filling `predicts`.
    pub async fn run(&self, records: &mut [SentenceRecord]) -> Result<()> {
        let total = records.len();
        info!(total, max_attempts = self.max_attempts, "Starting NER run");

        for (index, record) in records.iter_mut().enumerate() {
            let timer = TimedOperation::start();

            match self.process_sentence(record).await {
                Ok(trace) => {
                    info!(
                        sentence = index + 1,
                        total,
                        unfamiliar = trace.concepts.unfamiliar.len(),
                        ambiguous = trace.concepts.ambiguous.len(),
                        extraction_attempts = trace.extraction.attempts,
                        extraction_accepted = trace.extraction.is_accepted(),
                        reflection_attempts = trace.reflection.attempts,
                        reflection_accepted = trace.reflection.is_accepted(),
                        predicted = record.predicts.len(),
                        elapsed_ms = trace.elapsed.as_millis() as u64,
                        "Sentence processed"
                    );
                }
                Err(e) => {
                    self.metrics.record_sentence(timer.elapsed(), false);
                    match self.on_error {
                        ErrorPolicy::Skip => {
                            warn!(sentence = index + 1, total, error = %format!("{:#}", e), "Sentence failed, skipping");
                            record.predicts.clear();
                        }
                        ErrorPolicy::Abort => {
                            return Err(e.context(format!("Sentence {} of {} failed", index + 1, total)));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Run all four stages on one record and write its `predicts`.
    ///
    /// Errors come only from the planner and disambiguation calls; the
    /// extraction and reflection stages always end with a usable result.
    pub async fn process_sentence(&self, record: &mut SentenceRecord) -> Result<SentenceTrace> {
        let timer = TimedOperation::start();
        let sentence = record.sentence.as_str();

        self.metrics.record_llm_call();
        let concepts = ConceptPlanner::new(&self.llm, &self.prompts)
            .plan(sentence)
            .await?;

        let knowledge = self.gather_knowledge(sentence, &concepts).await?;

        let extractor = RetryingExtractor::new(&self.llm, self.max_attempts);

        let extraction = extractor
            .run(Stage::Extraction, sentence, || {
                self.prompts.extraction(sentence, &knowledge)
            })
            .await;
        self.metrics.record_stage(Stage::Extraction, &extraction);

        let reflection = extractor
            .run(Stage::Reflection, sentence, || {
                self.prompts.reflection(sentence, &extraction.result)
            })
            .await;
        self.metrics.record_stage(Stage::Reflection, &reflection);

        let predicts = reflection.result.entities.clone();
        let elapsed = timer.elapsed();
        self.metrics.record_sentence(elapsed, true);

        let trace = SentenceTrace {
            concepts,
            knowledge_chars: knowledge.unfamiliar.chars().count()
                + knowledge.disambiguation.chars().count(),
            extraction,
            reflection,
            elapsed,
        };
        record.predicts = predicts;

        Ok(trace)
    }

    /// Summaries for the unfamiliar concepts and one disambiguation answer
    /// for the ambiguous ones. Empty lists contribute nothing.
    pub async fn gather_knowledge(
        &self,
        sentence: &str,
        concepts: &ConceptLists,
    ) -> Result<KnowledgeContext> {
        let mut summaries = Vec::with_capacity(concepts.unfamiliar.len());
        for concept in &concepts.unfamiliar {
            let resolution = self.resolver.resolve_or_placeholder(concept).await;
            self.metrics.record_lookup(resolution.found);
            summaries.push(resolution.summary);
        }

        let disambiguation = if concepts.ambiguous.is_empty() {
            String::new()
        } else {
            let prompt = self.prompts.disambiguation(sentence, &concepts.ambiguous);
            self.metrics.record_llm_call();
            self.llm
                .complete(&prompt)
                .await
                .context("Disambiguation call failed")?
        };

        Ok(KnowledgeContext {
            unfamiliar: summaries.join("\n"),
            disambiguation,
        })
    }
}
