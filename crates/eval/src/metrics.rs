use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use extract::{Stage, StageOutcome};

/// Run-level counters, shared by the pipeline and the binary.
#[derive(Default)]
pub struct PipelineMetrics {
    // Sentences
    sentences_processed: AtomicUsize,
    sentences_failed: AtomicUsize,

    // Stage outcomes
    extraction_accepted: AtomicUsize,
    extraction_fallback: AtomicUsize,
    reflection_accepted: AtomicUsize,
    reflection_fallback: AtomicUsize,

    // External calls
    llm_calls: AtomicUsize,
    knowledge_lookups: AtomicUsize,
    knowledge_misses: AtomicUsize,

    // Timing (in microseconds)
    total_sentence_time_us: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_sentence(&self, duration: Duration, success: bool) {
        self.total_sentence_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if success {
            self.sentences_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sentences_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count one stage run; each attempt was one model call.
    pub fn record_stage(&self, stage: Stage, outcome: &StageOutcome) {
        self.llm_calls.fetch_add(outcome.attempts, Ordering::Relaxed);

        let counter = match (stage, outcome.is_accepted()) {
            (Stage::Extraction, true) => &self.extraction_accepted,
            (Stage::Extraction, false) => &self.extraction_fallback,
            (Stage::Reflection, true) => &self.reflection_accepted,
            (Stage::Reflection, false) => &self.reflection_fallback,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_llm_call(&self) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup(&self, found: bool) {
        self.knowledge_lookups.fetch_add(1, Ordering::Relaxed);
        if !found {
            self.knowledge_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let processed = self.sentences_processed.load(Ordering::Relaxed);
        let failed = self.sentences_failed.load(Ordering::Relaxed);
        let total_us = self.total_sentence_time_us.load(Ordering::Relaxed) as f64;
        let sentences = processed + failed;

        MetricsSnapshot {
            sentences_processed: processed,
            sentences_failed: failed,
            extraction_accepted: self.extraction_accepted.load(Ordering::Relaxed),
            extraction_fallback: self.extraction_fallback.load(Ordering::Relaxed),
            reflection_accepted: self.reflection_accepted.load(Ordering::Relaxed),
            reflection_fallback: self.reflection_fallback.load(Ordering::Relaxed),
            llm_calls: self.llm_calls.load(Ordering::Relaxed),
            knowledge_lookups: self.knowledge_lookups.load(Ordering::Relaxed),
            knowledge_misses: self.knowledge_misses.load(Ordering::Relaxed),
            avg_sentence_time_ms: if sentences > 0 {
                total_us / sentences as f64 / 1000.0 // Convert to ms
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub sentences_processed: usize,
    pub sentences_failed: usize,
    pub extraction_accepted: usize,
    pub extraction_fallback: usize,
    pub reflection_accepted: usize,
    pub reflection_fallback: usize,
    pub llm_calls: usize,
    pub knowledge_lookups: usize,
    pub knowledge_misses: usize,
    pub avg_sentence_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
