use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conversation::ConversationHistory;
use super::enums::{CaseStatus, PipelineStage};
use crate::pipeline::extraction::ExtractionOutcome;
use crate::pipeline::rag::RagOutcome;

/// Length of generated case ids.
pub const CASE_ID_LEN: usize = 8;

/// Generate a short case id (first eight hex characters of a v4 UUID).
pub fn generate_case_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..CASE_ID_LEN].to_string()
}

/// Stage at which a case run stopped, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub reason: String,
}

/// Everything a case run produced, persisted as one document keyed by
/// `case_id`. Stages that did not run leave their slot empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseBundle {
    pub case_id: String,
    pub status: CaseStatus,
    #[serde(default)]
    pub raw_uploaded_files: Vec<String>,
    #[serde(default)]
    pub processed_images: Vec<String>,
    #[serde(default)]
    pub ocr_ner_results: Option<ExtractionOutcome>,
    #[serde(default)]
    pub agenticrag_results: Option<RagOutcome>,
    #[serde(default)]
    pub policy_text_source: Option<String>,
    #[serde(default)]
    pub summary_policy: Option<String>,
    #[serde(default)]
    pub pa_determination_results: Option<String>,
    #[serde(default)]
    pub determination_model: Option<String>,
    #[serde(default)]
    pub conversation_history: ConversationHistory,
    #[serde(default)]
    pub failure: Option<StageFailure>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub elapsed_ms: Option<u64>,
}

impl CaseBundle {
    pub fn new(case_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            case_id: case_id.into(),
            status: CaseStatus::Running,
            raw_uploaded_files: Vec::new(),
            processed_images: Vec::new(),
            ocr_ner_results: None,
            agenticrag_results: None,
            policy_text_source: None,
            summary_policy: None,
            pa_determination_results: None,
            determination_model: None,
            conversation_history: ConversationHistory::new(),
            failure: None,
            started_at: now,
            updated_at: now,
            elapsed_ms: None,
        }
    }

    pub fn mark_failed(&mut self, stage: PipelineStage, reason: impl Into<String>) {
        self.status = CaseStatus::Failed;
        self.failure = Some(StageFailure {
            stage,
            reason: reason.into(),
        });
    }

    pub fn mark_completed(&mut self) {
        self.status = CaseStatus::Completed;
        self.failure = None;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Row shape returned by case listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub case_id: String,
    pub status: CaseStatus,
    pub failed_stage: Option<PipelineStage>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CaseBundle> for CaseSummary {
    fn from(bundle: &CaseBundle) -> Self {
        Self {
            case_id: bundle.case_id.clone(),
            status: bundle.status,
            failed_stage: bundle.failure.as_ref().map(|f| f.stage),
            updated_at: bundle.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_short_hex() {
        let id = generate_case_id();
        assert_eq!(id.len(), CASE_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_case_id());
    }

    #[test]
    fn new_bundle_is_running_and_empty() {
        let bundle = CaseBundle::new("abc12345");
        assert_eq!(bundle.status, CaseStatus::Running);
        assert!(bundle.ocr_ner_results.is_none());
        assert!(bundle.conversation_history.is_empty());
    }

    #[test]
    fn mark_failed_records_stage() {
        let mut bundle = CaseBundle::new("abc12345");
        bundle.mark_failed(PipelineStage::Retrieval, "no policies");
        assert_eq!(bundle.status, CaseStatus::Failed);
        let summary = CaseSummary::from(&bundle);
        assert_eq!(summary.failed_stage, Some(PipelineStage::Retrieval));
    }
}
