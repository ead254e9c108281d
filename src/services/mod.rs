pub mod generation;
pub mod orchestrator;
pub mod prompt_builder;
pub mod retrieval;

pub use generation::GenerationService;
pub use orchestrator::Orchestrator;
pub use prompt_builder::PromptBuilder;
pub use retrieval::RetrievalService;
