pub mod types;
pub mod classify;
pub mod orchestrator;

pub use types::*;
pub use classify::*;
pub use orchestrator::*;

use thiserror::Error;

use crate::llm::LlmError;
use crate::search::SearchError;

/// Failure of a single retrieval attempt. Never escapes the loop: each one
/// is logged and consumes an attempt.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}
