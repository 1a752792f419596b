pub mod types;
pub mod orchestrator;

pub use types::*;
pub use orchestrator::*;

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Extraction produced no {0} record")]
    MissingRecord(RecordKind),
}
