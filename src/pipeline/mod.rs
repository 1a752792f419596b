pub mod context;
pub mod prompts;
pub mod structuring;
pub mod extraction;
pub mod rag;
pub mod determination;
pub mod ingest;
pub mod processor; // Case orchestrator: ingest → extract → retrieve → determine

pub use context::ServiceContext;
pub use processor::{CaseReport, CaseRequest, PaProcessingPipeline, StageError};
