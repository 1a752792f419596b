//! Clinical records extracted from uploaded PA documents.
//!
//! Each record publishes a static field table so the validator can repair
//! raw LLM output field by field. Every text field defaults to
//! [`NOT_PROVIDED`].

use serde::{Deserialize, Serialize};

use crate::pipeline::structuring::schema::{
    record_default, FieldSpec, RecordSchema, SchemaRecord, NOT_PROVIDED,
};

fn not_provided() -> String {
    NOT_PROVIDED.to_string()
}

// ── Patient ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientRecord {
    pub patient_name: String,
    pub patient_date_of_birth: String,
    pub patient_id: String,
    pub patient_address: String,
    pub patient_phone_number: String,
}

impl Default for PatientRecord {
    fn default() -> Self {
        Self {
            patient_name: not_provided(),
            patient_date_of_birth: not_provided(),
            patient_id: not_provided(),
            patient_address: not_provided(),
            patient_phone_number: not_provided(),
        }
    }
}

static PATIENT_SCHEMA: RecordSchema = RecordSchema {
    name: "PatientRecord",
    fields: &[
        FieldSpec::text("patient_name"),
        FieldSpec::text("patient_date_of_birth"),
        FieldSpec::text("patient_id"),
        FieldSpec::text("patient_address"),
        FieldSpec::text("patient_phone_number"),
    ],
};

impl SchemaRecord for PatientRecord {
    fn schema() -> &'static RecordSchema {
        &PATIENT_SCHEMA
    }
}

// ── Physician ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicianContact {
    pub office_phone: String,
    pub fax: String,
    pub office_address: String,
}

impl Default for PhysicianContact {
    fn default() -> Self {
        Self {
            office_phone: not_provided(),
            fax: not_provided(),
            office_address: not_provided(),
        }
    }
}

static PHYSICIAN_CONTACT_SCHEMA: RecordSchema = RecordSchema {
    name: "PhysicianContact",
    fields: &[
        FieldSpec::text("office_phone"),
        FieldSpec::text("fax"),
        FieldSpec::text("office_address"),
    ],
};

impl SchemaRecord for PhysicianContact {
    fn schema() -> &'static RecordSchema {
        &PHYSICIAN_CONTACT_SCHEMA
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicianRecord {
    pub physician_name: String,
    pub specialty: String,
    pub physician_contact: PhysicianContact,
}

impl Default for PhysicianRecord {
    fn default() -> Self {
        Self {
            physician_name: not_provided(),
            specialty: not_provided(),
            physician_contact: PhysicianContact::default(),
        }
    }
}

static PHYSICIAN_SCHEMA: RecordSchema = RecordSchema {
    name: "PhysicianRecord",
    fields: &[
        FieldSpec::text("physician_name"),
        FieldSpec::text("specialty"),
        FieldSpec::record(
            "physician_contact",
            &PHYSICIAN_CONTACT_SCHEMA,
            record_default::<PhysicianContact>,
        ),
    ],
};

impl SchemaRecord for PhysicianRecord {
    fn schema() -> &'static RecordSchema {
        &PHYSICIAN_SCHEMA
    }
}

// ── Clinical ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreatmentRequest {
    pub name_of_medication_or_procedure: String,
    pub code_of_medication_or_procedure: String,
    pub dosage: String,
    pub duration: String,
    pub rationale: String,
    pub presumed_eligibility: String,
}

impl Default for TreatmentRequest {
    fn default() -> Self {
        Self {
            name_of_medication_or_procedure: not_provided(),
            code_of_medication_or_procedure: not_provided(),
            dosage: not_provided(),
            duration: not_provided(),
            rationale: not_provided(),
            presumed_eligibility: not_provided(),
        }
    }
}

static TREATMENT_REQUEST_SCHEMA: RecordSchema = RecordSchema {
    name: "TreatmentRequest",
    fields: &[
        FieldSpec::text("name_of_medication_or_procedure"),
        FieldSpec::text("code_of_medication_or_procedure"),
        FieldSpec::text("dosage"),
        FieldSpec::text("duration"),
        FieldSpec::text("rationale"),
        FieldSpec::text("presumed_eligibility"),
    ],
};

impl SchemaRecord for TreatmentRequest {
    fn schema() -> &'static RecordSchema {
        &TREATMENT_REQUEST_SCHEMA
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalRecord {
    pub diagnosis: String,
    pub icd_10_code: String,
    pub prior_treatments_and_results: String,
    pub specific_drugs_taken_and_failures: String,
    pub alternative_drugs_required: String,
    pub relevant_lab_results_or_imaging: String,
    pub symptom_severity_and_impact: String,
    pub prognosis_and_risk_if_not_approved: String,
    pub clinical_rationale_for_urgency: String,
    pub treatment_request: TreatmentRequest,
}

impl Default for ClinicalRecord {
    fn default() -> Self {
        Self {
            diagnosis: not_provided(),
            icd_10_code: not_provided(),
            prior_treatments_and_results: not_provided(),
            specific_drugs_taken_and_failures: not_provided(),
            alternative_drugs_required: not_provided(),
            relevant_lab_results_or_imaging: not_provided(),
            symptom_severity_and_impact: not_provided(),
            prognosis_and_risk_if_not_approved: not_provided(),
            clinical_rationale_for_urgency: not_provided(),
            treatment_request: TreatmentRequest::default(),
        }
    }
}

static CLINICAL_SCHEMA: RecordSchema = RecordSchema {
    name: "ClinicalRecord",
    fields: &[
        FieldSpec::text("diagnosis"),
        FieldSpec::text("icd_10_code"),
        FieldSpec::text("prior_treatments_and_results"),
        FieldSpec::text("specific_drugs_taken_and_failures"),
        FieldSpec::text("alternative_drugs_required"),
        FieldSpec::text("relevant_lab_results_or_imaging"),
        FieldSpec::text("symptom_severity_and_impact"),
        FieldSpec::text("prognosis_and_risk_if_not_approved"),
        FieldSpec::text("clinical_rationale_for_urgency"),
        FieldSpec::record(
            "treatment_request",
            &TREATMENT_REQUEST_SCHEMA,
            record_default::<TreatmentRequest>,
        ),
    ],
};

impl SchemaRecord for ClinicalRecord {
    fn schema() -> &'static RecordSchema {
        &CLINICAL_SCHEMA
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_not_provided() {
        let clinical = ClinicalRecord::default();
        assert_eq!(clinical.diagnosis, NOT_PROVIDED);
        assert_eq!(clinical.treatment_request.presumed_eligibility, NOT_PROVIDED);
        let physician = PhysicianRecord::default();
        assert_eq!(physician.physician_contact.fax, NOT_PROVIDED);
    }

    #[test]
    fn schemas_cover_every_serialized_field() {
        fn check<T: SchemaRecord + Serialize>() {
            let value = serde_json::to_value(T::default()).unwrap();
            let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
            assert_eq!(keys.len(), T::schema().fields.len(), "{}", T::schema().name);
            for key in keys {
                assert!(T::schema().field(key).is_some(), "{key} missing from schema");
            }
        }
        check::<PatientRecord>();
        check::<PhysicianContact>();
        check::<PhysicianRecord>();
        check::<TreatmentRequest>();
        check::<ClinicalRecord>();
    }

    #[test]
    fn nested_factory_builds_record_default() {
        let value = record_default::<TreatmentRequest>();
        assert_eq!(value["dosage"], NOT_PROVIDED);
    }
}
