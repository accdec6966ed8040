pub mod config;
pub mod dataset;
pub mod metrics;
pub mod pipeline;
pub mod scorer;

pub use config::{ErrorPolicy, KnowledgeConfig, LlmConfig, RetryConfig, RunConfig};
pub use dataset::{GoldEntity, SentenceRecord, load_dataset, load_resources, save_dataset, truncate_to_limit};
pub use metrics::{MetricsSnapshot, PipelineMetrics, TimedOperation};
pub use pipeline::{NerPipeline, SentenceTrace};
pub use scorer::{Prf, score, score_by_type};
