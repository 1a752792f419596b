//! Case processing orchestrator.
//!
//! Drives one prior-authorization case end to end:
//! ingest → extract → retrieve policy → fetch policy text → determine,
//! then stores whatever the run produced under the case id.
//!
//! All collaborators come from the [`ServiceContext`], so the orchestrator
//! runs unchanged against the in-memory fakes in tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tempfile::TempDir;

use crate::documents::DocumentError;
use crate::llm::{ChatRequest, LlmClient, LlmError};
use crate::models::{generate_case_id, CaseBundle, CaseStatus, PipelineStage, StageFailure};
use crate::pipeline::context::ServiceContext;
use crate::pipeline::determination::{AutoDeterminator, DeterminationError};
use crate::pipeline::extraction::{ClinicalDataExtractor, ExtractionError};
use crate::pipeline::ingest::{DocumentIngestor, IngestError};
use crate::pipeline::prompts::{build_policy_summary_prompt, SUMMARIZE_POLICY_SYSTEM};
use crate::pipeline::rag::AgenticRag;
use crate::settings::CompletionSettings;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure that ends a case run. Each variant belongs to one stage.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Could not create case workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("Ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("No page images could be produced from the uploaded files")]
    NoImages,

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("No applicable policy was found")]
    NoPolicies,

    #[error("Policy text unavailable: {0}")]
    PolicyText(#[from] DocumentError),

    #[error("Determination failed: {0}")]
    Determination(#[from] DeterminationError),
}

impl StageError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Workspace(_) | Self::Ingest(_) | Self::NoImages => PipelineStage::Ingestion,
            Self::Extraction(_) => PipelineStage::Extraction,
            Self::NoPolicies => PipelineStage::Retrieval,
            Self::PolicyText(_) => PipelineStage::PolicyText,
            Self::Determination(_) => PipelineStage::Determination,
        }
    }
}

// ---------------------------------------------------------------------------
// Request / report
// ---------------------------------------------------------------------------

/// Input of one case run.
#[derive(Debug, Clone, Default)]
pub struct CaseRequest {
    /// Generated when absent or blank.
    pub case_id: Option<String>,
    pub files: Vec<PathBuf>,
    /// Try the reasoning model first for the determination.
    pub use_reasoning_model: bool,
}

impl CaseRequest {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    pub fn with_case_id(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = Some(case_id.into());
        self
    }

    pub fn with_reasoning_model(mut self, enabled: bool) -> Self {
        self.use_reasoning_model = enabled;
        self
    }
}

/// Outcome of one case run, as returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub case_id: String,
    pub status: CaseStatus,
    pub failure: Option<StageFailure>,
    pub determination: Option<String>,
    pub elapsed_ms: u64,
    pub bundle: CaseBundle,
}

impl CaseReport {
    pub fn is_success(&self) -> bool {
        self.status == CaseStatus::Completed
    }
}

impl From<CaseBundle> for CaseReport {
    fn from(bundle: CaseBundle) -> Self {
        Self {
            case_id: bundle.case_id.clone(),
            status: bundle.status,
            failure: bundle.failure.clone(),
            determination: bundle.pa_determination_results.clone(),
            elapsed_ms: bundle.elapsed_ms.unwrap_or(0),
            bundle,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs cases through every stage. Stage failures end the run for that
/// case only; they are logged, recorded in the bundle and never returned
/// as errors.
pub struct PaProcessingPipeline {
    ctx: ServiceContext,
}

impl PaProcessingPipeline {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, request: CaseRequest) -> CaseReport {
        let case_id = request
            .case_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_case_id);
        let started = Instant::now();
        let mut bundle = CaseBundle::new(&case_id);
        let mut workdir: Option<TempDir> = None;

        tracing::info!(
            case_id = %case_id,
            files = request.files.len(),
            use_reasoning_model = request.use_reasoning_model,
            "Processing case"
        );

        match self.execute(&request, &mut bundle, &mut workdir).await {
            Ok(()) => bundle.mark_completed(),
            Err(e) => {
                tracing::error!(
                    case_id = %case_id,
                    stage = %e.stage(),
                    error = %e,
                    "Case processing failed"
                );
                bundle.mark_failed(e.stage(), e.to_string());
            }
        }

        // Cleanup and persistence run whatever the outcome.
        if let Some(dir) = workdir.take() {
            let path = dir.path().display().to_string();
            if let Err(e) = dir.close() {
                tracing::warn!(case_id = %case_id, path = %path, error = %e, "Workspace cleanup failed");
            }
        }

        bundle.elapsed_ms = Some(started.elapsed().as_millis() as u64);
        bundle.touch();
        if let Err(e) = self.ctx.cases.upsert(&bundle) {
            tracing::error!(case_id = %case_id, error = %e, "Failed to store case bundle");
        }

        tracing::info!(
            case_id = %case_id,
            status = %bundle.status,
            elapsed_ms = bundle.elapsed_ms.unwrap_or(0),
            "Case finished"
        );
        CaseReport::from(bundle)
    }

    async fn execute(
        &self,
        request: &CaseRequest,
        bundle: &mut CaseBundle,
        workdir: &mut Option<TempDir>,
    ) -> Result<(), StageError> {
        let ctx = &self.ctx;
        let case_id = bundle.case_id.clone();

        // Step 1: Ingest
        let dir = tempfile::Builder::new()
            .prefix(&format!("autopa-{case_id}-"))
            .tempdir()
            .map_err(StageError::Workspace)?;
        let dir_path: &Path = workdir.insert(dir).path();

        let ingestor = DocumentIngestor::new(
            Arc::clone(&ctx.renderer),
            Arc::clone(&ctx.artifacts),
            ctx.settings.render_dpi,
            &case_id,
        );
        bundle.raw_uploaded_files = ingestor.upload_raw(&request.files).await;
        let images = ingestor.render(&request.files, dir_path).await?;
        if images.is_empty() {
            return Err(StageError::NoImages);
        }
        bundle.processed_images = ingestor.upload_images(&images).await;

        // Step 2: Extract
        let extraction = ClinicalDataExtractor::new(Arc::clone(&ctx.llm), Arc::clone(&ctx.settings), &case_id)
            .run(&images)
            .await;
        bundle.ocr_ner_results = Some(extraction.clone());
        let (patient, physician, clinical) = extraction.require_all()?;

        // Step 3: Retrieve
        let rag = AgenticRag::new(
            Arc::clone(&ctx.llm),
            Arc::clone(&ctx.search),
            Arc::clone(&ctx.settings),
            &case_id,
        )
        .run(&clinical)
        .await;
        bundle.agenticrag_results = Some(rag.clone());
        let policy = rag.top_policy().ok_or(StageError::NoPolicies)?.to_string();

        // Step 4: Policy text
        bundle.policy_text_source = Some(policy.clone());
        let policy_text = ctx.policies.fetch_text(&policy).await?;
        tracing::info!(case_id = %case_id, policy = %policy, chars = policy_text.len(), "Policy text resolved");

        // Step 5: Determine
        let summary_slot = Arc::new(Mutex::new(None));
        let summarize = policy_summarizer(
            Arc::clone(&ctx.llm),
            ctx.settings.summarization.clone(),
            &case_id,
            Arc::clone(&summary_slot),
        );
        let determination = AutoDeterminator::new(
            Arc::clone(&ctx.llm),
            ctx.reasoning_llm.clone(),
            Arc::clone(&ctx.settings),
            &case_id,
        )
        .run(
            &patient,
            &physician,
            &clinical,
            &policy_text,
            &summarize,
            request.use_reasoning_model,
        )
        .await;

        // Recorded even when the determination itself failed.
        bundle.summary_policy = summary_slot.lock().ok().and_then(|s| s.clone());

        let determination = determination?;
        bundle.pa_determination_results = Some(determination.text);
        bundle.determination_model = Some(determination.model);
        bundle.conversation_history = determination.conversation_history;
        Ok(())
    }
}

/// Summarization callback handed to the determination stage. The latest
/// summary is also written to `slot`.
fn policy_summarizer(
    llm: Arc<dyn LlmClient>,
    settings: CompletionSettings,
    case_id: &str,
    slot: Arc<Mutex<Option<String>>>,
) -> impl Fn(String) -> BoxFuture<'static, Result<String, LlmError>> + Send + Sync {
    let case_id = case_id.to_string();
    move |policy_text: String| {
        let llm = Arc::clone(&llm);
        let settings = settings.clone();
        let case_id = case_id.clone();
        let slot = Arc::clone(&slot);
        async move {
            tracing::info!(case_id = %case_id, chars = policy_text.len(), "Summarizing policy");
            let request = ChatRequest::new(build_policy_summary_prompt(&policy_text))
                .with_system(SUMMARIZE_POLICY_SYSTEM)
                .with_settings(settings);
            let summary = llm.chat(request).await?.into_reply()?.body.text();
            if summary.trim().is_empty() {
                return Err(LlmError::EmptyResponse);
            }
            if let Ok(mut guard) = slot.lock() {
                *guard = Some(summary.clone());
            }
            Ok(summary)
        }
        .boxed()
    }
}
