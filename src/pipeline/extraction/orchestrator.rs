use std::path::PathBuf;
use std::sync::Arc;

use super::types::{ExtractionOutcome, RecordKind};
use super::ExtractionError;
use crate::llm::{ChatRequest, LlmClient};
use crate::models::{ClinicalRecord, PatientRecord, PhysicianRecord};
use crate::pipeline::prompts::{
    build_clinical_extraction_prompt, build_patient_extraction_prompt,
    build_physician_extraction_prompt, CLINICAL_EXTRACTION_SYSTEM, PATIENT_EXTRACTION_SYSTEM,
    PHYSICIAN_EXTRACTION_SYSTEM,
};
use crate::pipeline::structuring::{validate_with_report, SchemaRecord};
use crate::settings::{CompletionSettings, PipelineSettings};

/// Extracts patient, physician and clinical records from rendered document
/// pages with three concurrent vision calls.
pub struct ClinicalDataExtractor {
    llm: Arc<dyn LlmClient>,
    settings: Arc<PipelineSettings>,
    case_id: String,
}

impl ClinicalDataExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, settings: Arc<PipelineSettings>, case_id: &str) -> Self {
        Self {
            llm,
            settings,
            case_id: case_id.to_string(),
        }
    }

    /// Run all three extractions and wait for every one of them. A failed
    /// call leaves its slot empty without affecting the others.
    pub async fn run(&self, images: &[PathBuf]) -> ExtractionOutcome {
        tracing::info!(
            case_id = %self.case_id,
            pages = images.len(),
            "Extracting clinical data"
        );

        let (patient, physician, clinical) = tokio::join!(
            self.extract::<PatientRecord>(RecordKind::Patient, images),
            self.extract::<PhysicianRecord>(RecordKind::Physician, images),
            self.extract::<ClinicalRecord>(RecordKind::Clinical, images),
        );

        ExtractionOutcome {
            patient: self.slot(RecordKind::Patient, patient),
            physician: self.slot(RecordKind::Physician, physician),
            clinical: self.slot(RecordKind::Clinical, clinical),
        }
    }

    fn slot<T>(&self, kind: RecordKind, result: Result<T, ExtractionError>) -> Option<T> {
        match result {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    case_id = %self.case_id,
                    record = %kind,
                    error = %e,
                    "Extraction call failed"
                );
                None
            }
        }
    }

    fn request_for(&self, kind: RecordKind) -> (&'static str, String, CompletionSettings) {
        match kind {
            RecordKind::Patient => (
                PATIENT_EXTRACTION_SYSTEM,
                build_patient_extraction_prompt(),
                self.settings.patient_extraction.clone(),
            ),
            RecordKind::Physician => (
                PHYSICIAN_EXTRACTION_SYSTEM,
                build_physician_extraction_prompt(),
                self.settings.physician_extraction.clone(),
            ),
            RecordKind::Clinical => (
                CLINICAL_EXTRACTION_SYSTEM,
                build_clinical_extraction_prompt(),
                self.settings.clinical_extraction.clone(),
            ),
        }
    }

    async fn extract<T: SchemaRecord>(
        &self,
        kind: RecordKind,
        images: &[PathBuf],
    ) -> Result<T, ExtractionError> {
        let (system, prompt, settings) = self.request_for(kind);
        let request = ChatRequest::new(prompt)
            .with_system(system)
            .with_images(images.to_vec())
            .with_settings(settings)
            .json();

        let reply = self.llm.chat(request).await?.into_reply()?;
        let raw = reply.body.into_json()?;
        let validated = validate_with_report::<T>(&raw);

        tracing::debug!(
            case_id = %self.case_id,
            record = %kind,
            repaired_fields = validated.repairs.len(),
            "Extraction validated"
        );
        Ok(validated.record)
    }
}
