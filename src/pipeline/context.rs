use std::sync::Arc;

use crate::db::CaseStore;
use crate::documents::{PageRenderer, PolicySource};
use crate::llm::LlmClient;
use crate::search::PolicySearch;
use crate::settings::PipelineSettings;
use crate::storage::ArtifactStore;

/// Long-lived collaborators shared by every stage of a case run.
/// Constructed once and handed to each component.
#[derive(Clone)]
pub struct ServiceContext {
    /// Chat model used for extraction, retrieval, summarization and the
    /// secondary determination attempts.
    pub llm: Arc<dyn LlmClient>,
    /// High-capability model tried first for the determination, if any.
    pub reasoning_llm: Option<Arc<dyn LlmClient>>,
    pub search: Arc<dyn PolicySearch>,
    pub policies: Arc<dyn PolicySource>,
    pub renderer: Arc<dyn PageRenderer>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub cases: Arc<dyn CaseStore>,
    pub settings: Arc<PipelineSettings>,
}
