pub mod cache;
pub mod resolver;
pub mod source;
pub mod wikipedia;

pub use cache::SummaryCache;
pub use resolver::{KnowledgeResolver, Resolution, placeholder};
pub use source::{KnowledgeSource, LookupError};
pub use wikipedia::WikipediaClient;
