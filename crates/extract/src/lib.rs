pub mod extractor;
pub mod llm;
pub mod planner;
pub mod prompt;
pub mod repair;
pub mod retry;
pub mod schema;
pub mod validator;

pub use extractor::{AttemptFailure, RetryingExtractor, Stage, StageOutcome, StageStatus};
pub use llm::{ChatClient, ChatError, ChatMessage, ChatModel, ScriptedModel};
pub use planner::{ConceptPlanner, parse_concepts};
pub use prompt::{DatasetResources, KnowledgeContext, PromptBuilder};
pub use repair::{ParseError, parse, parse_model_output, repair};
pub use retry::RetryPolicy;
pub use schema::{ConceptLists, Entity, ExtractionResult};
pub use validator::{FieldType, Schema};
