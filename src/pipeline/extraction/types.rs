use serde::{Deserialize, Serialize};

use super::ExtractionError;
use crate::models::{ClinicalRecord, PatientRecord, PhysicianRecord};

/// The three record types extracted from every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Patient,
    Physician,
    Clinical,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Patient => "patient",
            RecordKind::Physician => "physician",
            RecordKind::Clinical => "clinical",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result slots of the three concurrent extraction calls. A slot is `None`
/// when its call failed; the other slots are unaffected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    #[serde(rename = "patient_info")]
    pub patient: Option<PatientRecord>,
    #[serde(rename = "physician_info")]
    pub physician: Option<PhysicianRecord>,
    #[serde(rename = "clinical_info")]
    pub clinical: Option<ClinicalRecord>,
}

impl ExtractionOutcome {
    pub fn missing(&self) -> Vec<RecordKind> {
        let mut missing = Vec::new();
        if self.patient.is_none() {
            missing.push(RecordKind::Patient);
        }
        if self.physician.is_none() {
            missing.push(RecordKind::Physician);
        }
        if self.clinical.is_none() {
            missing.push(RecordKind::Clinical);
        }
        missing
    }

    /// All three records, or the first missing slot as an error.
    pub fn require_all(
        &self,
    ) -> Result<(PatientRecord, PhysicianRecord, ClinicalRecord), ExtractionError> {
        match (&self.patient, &self.physician, &self.clinical) {
            (Some(p), Some(ph), Some(c)) => Ok((p.clone(), ph.clone(), c.clone())),
            _ => Err(ExtractionError::MissingRecord(self.missing()[0])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_all_reports_first_missing_slot() {
        let outcome = ExtractionOutcome {
            patient: Some(PatientRecord::default()),
            physician: None,
            clinical: None,
        };
        assert_eq!(outcome.missing(), vec![RecordKind::Physician, RecordKind::Clinical]);
        let err = outcome.require_all().unwrap_err();
        assert!(matches!(err, ExtractionError::MissingRecord(RecordKind::Physician)));
    }

    #[test]
    fn serializes_with_stage_keys() {
        let outcome = ExtractionOutcome {
            patient: Some(PatientRecord::default()),
            ..Default::default()
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json["patient_info"].is_object());
        assert!(json["physician_info"].is_null());
        assert!(json.get("clinical_info").is_some());
    }
}
