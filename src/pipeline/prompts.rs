//! System prompts and user-prompt builders for every LLM call in a case run.
//!
//! Extraction prompts derive their JSON outline from the record field
//! tables, so the keys the model is asked for always match what the
//! validator expects.

use crate::models::{ClinicalRecord, PatientRecord, PhysicianRecord};
use crate::pipeline::structuring::schema::{FieldKind, RecordSchema, SchemaRecord};

// ═══════════════════════════════════════════
// Extraction
// ═══════════════════════════════════════════

pub const PATIENT_EXTRACTION_SYSTEM: &str = "You are a medical records specialist. \
You read scanned prior-authorization forms and extract patient demographics exactly as written. \
Never guess: when a value is absent or illegible, use \"Not provided\". \
Respond with a single JSON object and nothing else.";

pub const PHYSICIAN_EXTRACTION_SYSTEM: &str = "You are a medical records specialist. \
You read scanned prior-authorization forms and extract the requesting physician's identity and contact details exactly as written. \
Never guess: when a value is absent or illegible, use \"Not provided\". \
Respond with a single JSON object and nothing else.";

pub const CLINICAL_EXTRACTION_SYSTEM: &str = "You are a clinical documentation specialist. \
You read scanned prior-authorization forms, clinical notes and lab reports, and extract the diagnosis, \
treatment history and the requested treatment. Keep clinical wording and codes exactly as written. \
Never guess: when a value is absent or illegible, use \"Not provided\". \
Respond with a single JSON object and nothing else.";

/// JSON skeleton of a record: every key with a short type hint.
pub fn schema_outline(schema: &RecordSchema) -> String {
    fn render(schema: &RecordSchema, indent: usize, out: &mut String) {
        let pad = "  ".repeat(indent + 1);
        out.push_str("{\n");
        for (i, spec) in schema.fields.iter().enumerate() {
            out.push_str(&format!("{pad}\"{}\": ", spec.external_name()));
            match spec.kind {
                FieldKind::Record(nested) => render(nested, indent + 1, out),
                kind => out.push_str(&format!("<{}>", kind.label())),
            }
            if i + 1 < schema.fields.len() {
                out.push(',');
            }
            out.push('\n');
        }
        out.push_str(&"  ".repeat(indent));
        out.push('}');
    }

    let mut out = String::new();
    render(schema, 0, &mut out);
    out
}

fn extraction_prompt<T: SchemaRecord>(subject: &str) -> String {
    format!(
        "Extract the {subject} from the attached document pages.\n\n\
         Return JSON with exactly these keys:\n{}\n\n\
         Use \"Not provided\" for any value that does not appear in the documents.",
        schema_outline(T::schema())
    )
}

pub fn build_patient_extraction_prompt() -> String {
    extraction_prompt::<PatientRecord>("patient information")
}

pub fn build_physician_extraction_prompt() -> String {
    extraction_prompt::<PhysicianRecord>("physician information")
}

pub fn build_clinical_extraction_prompt() -> String {
    extraction_prompt::<ClinicalRecord>(
        "clinical information (diagnosis, treatment history, lab results, and the treatment being requested)",
    )
}

// ═══════════════════════════════════════════
// Retrieval
// ═══════════════════════════════════════════

pub const QUERY_EXPANSION_SYSTEM: &str = "You are an expert in health-insurance prior authorization. \
You turn clinical case details into a search query that finds the payer policy governing the requested treatment. \
Respond with a single JSON object and nothing else.";

pub fn build_query_expansion_prompt(clinical: &ClinicalRecord) -> String {
    let treatment = &clinical.treatment_request;
    format!(
        "Formulate an optimized search query for the prior-authorization policy that applies to this request.\n\n\
         Diagnosis: {}\n\
         Medication or procedure: {}\n\
         Code: {}\n\
         Dosage: {}\n\
         Duration: {}\n\
         Rationale: {}\n\n\
         Include the diagnosis, the medication or procedure (generic and brand names), relevant synonyms \
         and codes. Skip any field marked \"Not provided\".\n\n\
         Return JSON: {{\"optimized_query\": \"<query>\"}}",
        clinical.diagnosis,
        treatment.name_of_medication_or_procedure,
        treatment.code_of_medication_or_procedure,
        treatment.dosage,
        treatment.duration,
        treatment.rationale,
    )
}

pub const EVALUATOR_SYSTEM: &str = "You are an expert reviewer of health-insurance policies. \
You decide which retrieved policy documents govern a prior-authorization request. \
Respond with a single JSON object and nothing else.";

pub fn build_evaluation_prompt(query: &str, formatted_results: &str) -> String {
    format!(
        "Query: {query}\n\n\
         Search results:\n{formatted_results}\n\n\
         Select the policy documents that directly govern the medication or procedure and diagnosis in the query. \
         List each document's Source Doc Path once, most relevant first, with one reasoning sentence per path. \
         Set \"retry\" to true when no result is clearly applicable.\n\n\
         Return JSON: {{\"policies\": [\"<source doc path>\"], \"reasoning\": [\"<why>\"], \"retry\": <true|false>}}"
    )
}

pub const QUERY_CLASSIFIER_SYSTEM: &str = "You classify search queries for a policy search engine. \
Respond with a single JSON object and nothing else.";

pub fn build_query_classifier_prompt(query: &str) -> String {
    format!(
        "Classify the query below.\n\
         - \"keyword\": short, exact terms such as drug names or codes\n\
         - \"semantic\": natural-language questions or descriptions\n\
         - \"hybrid\": a mix of exact terms and descriptive language\n\n\
         Query: {query}\n\n\
         Return JSON: {{\"classification\": \"keyword\" | \"semantic\" | \"hybrid\"}}"
    )
}

// ═══════════════════════════════════════════
// Determination
// ═══════════════════════════════════════════

pub const SUMMARIZE_POLICY_SYSTEM: &str = "You are an expert in health-insurance policy. \
You condense coverage policies while keeping every criterion needed for a prior-authorization decision.";

pub fn build_policy_summary_prompt(policy_text: &str) -> String {
    format!(
        "Summarize the policy below for a prior-authorization reviewer. Keep every coverage criterion, \
         step-therapy requirement, required documentation, dosing limit, exclusion and approval duration. \
         Drop boilerplate, contact details and revision history.\n\n\
         Policy:\n{policy_text}"
    )
}

pub const DETERMINATION_SYSTEM: &str = "You are a prior-authorization reviewer for a health plan. \
You compare a case against the plan's coverage policy criterion by criterion and decide whether to approve, \
deny, or request more information. Base every finding on the case data and policy text provided.";

/// Decision prompt. The reasoning-model variant carries the reviewer role
/// inline because that family takes no system message.
pub fn build_determination_prompt(
    patient: &PatientRecord,
    physician: &PhysicianRecord,
    clinical: &ClinicalRecord,
    policy_text: &str,
    reasoning_model: bool,
) -> String {
    let contact = &physician.physician_contact;
    let treatment = &clinical.treatment_request;

    let case = format!(
        "## Patient Information\n\
         - Name: {}\n- Date of Birth: {}\n- Patient ID: {}\n- Address: {}\n- Phone: {}\n\n\
         ## Physician Information\n\
         - Name: {}\n- Specialty: {}\n- Office Phone: {}\n- Fax: {}\n- Office Address: {}\n\n\
         ## Clinical Information\n\
         - Diagnosis: {}\n- ICD-10 Code: {}\n- Prior Treatments and Results: {}\n\
         - Specific Drugs Taken and Failures: {}\n- Alternative Drugs Required: {}\n\
         - Relevant Lab Results or Imaging: {}\n- Symptom Severity and Impact: {}\n\
         - Prognosis and Risk if Not Approved: {}\n- Clinical Rationale for Urgency: {}\n\n\
         ## Treatment Request\n\
         - Medication or Procedure: {}\n- Code: {}\n- Dosage: {}\n- Duration: {}\n\
         - Rationale: {}\n- Presumed Eligibility: {}\n\n\
         ## Policy\n{}",
        patient.patient_name,
        patient.patient_date_of_birth,
        patient.patient_id,
        patient.patient_address,
        patient.patient_phone_number,
        physician.physician_name,
        physician.specialty,
        contact.office_phone,
        contact.fax,
        contact.office_address,
        clinical.diagnosis,
        clinical.icd_10_code,
        clinical.prior_treatments_and_results,
        clinical.specific_drugs_taken_and_failures,
        clinical.alternative_drugs_required,
        clinical.relevant_lab_results_or_imaging,
        clinical.symptom_severity_and_impact,
        clinical.prognosis_and_risk_if_not_approved,
        clinical.clinical_rationale_for_urgency,
        treatment.name_of_medication_or_procedure,
        treatment.code_of_medication_or_procedure,
        treatment.dosage,
        treatment.duration,
        treatment.rationale,
        treatment.presumed_eligibility,
        policy_text,
    );

    let instructions = "For each policy criterion, state whether the case meets it and cite the supporting case data. \
         Then give the final determination on its own line as \"Final Determination: APPROVED\", \
         \"Final Determination: DENIED\" or \"Final Determination: NEEDS MORE INFORMATION\", \
         followed by a short rationale.";

    if reasoning_model {
        format!("{DETERMINATION_SYSTEM}\n\n{case}\n\n{instructions}")
    } else {
        format!("{case}\n\n{instructions}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_lists_every_clinical_key_including_nested() {
        let outline = schema_outline(ClinicalRecord::schema());
        for spec in ClinicalRecord::schema().fields {
            assert!(outline.contains(&format!("\"{}\"", spec.name)), "{}", spec.name);
        }
        assert!(outline.contains("\"presumed_eligibility\": <text>"));
        assert!(!outline.contains("<TreatmentRequest>"));
    }

    #[test]
    fn extraction_prompts_name_their_record_keys() {
        assert!(build_patient_extraction_prompt().contains("\"patient_date_of_birth\""));
        assert!(build_physician_extraction_prompt().contains("\"office_phone\""));
        assert!(build_clinical_extraction_prompt().contains("\"icd_10_code\""));
    }

    #[test]
    fn expansion_prompt_carries_treatment_fields() {
        let mut clinical = ClinicalRecord::default();
        clinical.diagnosis = "Crohn's Disease".into();
        clinical.treatment_request.name_of_medication_or_procedure = "Humira".into();
        let prompt = build_query_expansion_prompt(&clinical);
        assert!(prompt.contains("Diagnosis: Crohn's Disease"));
        assert!(prompt.contains("Medication or procedure: Humira"));
        assert!(prompt.contains("optimized_query"));
    }

    #[test]
    fn determination_prompt_variants() {
        let prompt = |reasoning| {
            build_determination_prompt(
                &PatientRecord::default(),
                &PhysicianRecord::default(),
                &ClinicalRecord::default(),
                "POLICY BODY",
                reasoning,
            )
        };
        let chat = prompt(false);
        let reasoning = prompt(true);
        assert!(chat.contains("POLICY BODY"));
        assert!(!chat.starts_with(DETERMINATION_SYSTEM));
        assert!(reasoning.starts_with(DETERMINATION_SYSTEM));
        assert!(reasoning.contains("Final Determination"));
    }
}
