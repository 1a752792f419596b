pub mod types;
pub mod orchestrator;

pub use types::*;
pub use orchestrator::*;

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum DeterminationError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Policy summarization failed: {0}")]
    Summarization(#[source] LlmError),
}
