use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;
use crate::models::{CaseBundle, CaseStatus, CaseSummary, PipelineStage};

/// Persistence of case result bundles, keyed by case id.
///
/// `upsert` is idempotent: re-running a case with the same id replaces
/// the stored bundle.
pub trait CaseStore: Send + Sync {
    fn upsert(&self, bundle: &CaseBundle) -> Result<(), DatabaseError>;

    fn get(&self, case_id: &str) -> Result<Option<CaseBundle>, DatabaseError>;

    /// All cases, most recently updated first.
    fn list(&self) -> Result<Vec<CaseSummary>, DatabaseError>;
}

/// SQLite-backed case store. The bundle is stored as a JSON document next
/// to a few indexed columns.
pub struct SqliteCaseStore {
    conn: Mutex<Connection>,
}

impl SqliteCaseStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Serialization(format!("bad timestamp {value}: {e}")))
}

impl CaseStore for SqliteCaseStore {
    fn upsert(&self, bundle: &CaseBundle) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(bundle)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let failed_stage = bundle.failure.as_ref().map(|f| f.stage.as_str());

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO cases (case_id, status, failed_stage, bundle, started_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(case_id) DO UPDATE SET
                status = excluded.status,
                failed_stage = excluded.failed_stage,
                bundle = excluded.bundle,
                started_at = excluded.started_at,
                updated_at = excluded.updated_at",
            params![
                bundle.case_id,
                bundle.status.as_str(),
                failed_stage,
                json,
                bundle.started_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                bundle.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        tracing::debug!(case_id = %bundle.case_id, status = %bundle.status, "Case bundle stored");
        Ok(())
    }

    fn get(&self, case_id: &str) -> Result<Option<CaseBundle>, DatabaseError> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT bundle FROM cases WHERE case_id = ?1",
                params![case_id],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|j| {
            serde_json::from_str(&j).map_err(|e| DatabaseError::Serialization(e.to_string()))
        })
        .transpose()
    }

    fn list(&self) -> Result<Vec<CaseSummary>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT case_id, status, failed_stage, updated_at FROM cases
             ORDER BY updated_at DESC, case_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (case_id, status, failed_stage, updated_at) = row?;
            summaries.push(CaseSummary {
                case_id,
                status: CaseStatus::from_str(&status)?,
                failed_stage: failed_stage
                    .as_deref()
                    .map(PipelineStage::from_str)
                    .transpose()?,
                updated_at: parse_timestamp(&updated_at)?,
            });
        }
        Ok(summaries)
    }
}

/// In-memory case store for testing.
#[derive(Default)]
pub struct InMemoryCaseStore {
    cases: Mutex<HashMap<String, CaseBundle>>,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cases.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CaseStore for InMemoryCaseStore {
    fn upsert(&self, bundle: &CaseBundle) -> Result<(), DatabaseError> {
        self.cases
            .lock()
            .map_err(|_| DatabaseError::LockPoisoned)?
            .insert(bundle.case_id.clone(), bundle.clone());
        Ok(())
    }

    fn get(&self, case_id: &str) -> Result<Option<CaseBundle>, DatabaseError> {
        Ok(self
            .cases
            .lock()
            .map_err(|_| DatabaseError::LockPoisoned)?
            .get(case_id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<CaseSummary>, DatabaseError> {
        let cases = self.cases.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let mut summaries: Vec<CaseSummary> = cases.values().map(CaseSummary::from).collect();
        summaries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.case_id.cmp(&b.case_id))
        });
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::models::{ChatMessage, ClinicalRecord, PatientRecord};
    use crate::pipeline::extraction::ExtractionOutcome;
    use crate::pipeline::rag::{PolicyEvaluation, RagOutcome};

    fn sqlite_store() -> SqliteCaseStore {
        SqliteCaseStore::new(open_memory_database().unwrap())
    }

    fn completed_bundle(case_id: &str) -> CaseBundle {
        let mut bundle = CaseBundle::new(case_id);
        bundle.raw_uploaded_files = vec!["cases/x/raw_uploaded_files/form.pdf".into()];
        bundle.ocr_ner_results = Some(ExtractionOutcome {
            patient: Some(PatientRecord {
                patient_name: "Jane Doe".into(),
                ..PatientRecord::default()
            }),
            physician: None,
            clinical: Some(ClinicalRecord {
                diagnosis: "Crohn's Disease".into(),
                ..ClinicalRecord::default()
            }),
        });
        bundle.agenticrag_results = Some(RagOutcome {
            query: Some("crohn adalimumab".into()),
            policies: vec!["policies/humira.pdf".into()],
            evaluation: Some(PolicyEvaluation {
                policies: vec!["policies/humira.pdf".into()],
                reasoning: vec!["matches diagnosis".into()],
                retry: false,
            }),
        });
        bundle.pa_determination_results = Some("Approved".into());
        bundle.conversation_history.push(ChatMessage::assistant("Approved"));
        bundle.mark_completed();
        bundle
    }

    fn round_trip(store: &dyn CaseStore) {
        let bundle = completed_bundle("abc12345");
        store.upsert(&bundle).unwrap();
        let loaded = store.get("abc12345").unwrap().unwrap();
        assert_eq!(loaded, bundle);
        assert!(store.get("missing0").unwrap().is_none());
    }

    #[test]
    fn sqlite_round_trip_preserves_stage_outputs() {
        round_trip(&sqlite_store());
    }

    #[test]
    fn in_memory_round_trip_preserves_stage_outputs() {
        round_trip(&InMemoryCaseStore::new());
    }

    #[test]
    fn upsert_is_idempotent_per_case_id() {
        let store = sqlite_store();
        let mut bundle = CaseBundle::new("abc12345");
        store.upsert(&bundle).unwrap();
        bundle.mark_failed(PipelineStage::Retrieval, "no policies");
        bundle.touch();
        store.upsert(&bundle).unwrap();

        let summaries = store.list().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].status, CaseStatus::Failed);
        assert_eq!(summaries[0].failed_stage, Some(PipelineStage::Retrieval));
        assert_eq!(store.get("abc12345").unwrap().unwrap(), bundle);
    }

    #[test]
    fn list_orders_most_recent_first() {
        let store = sqlite_store();
        let mut older = CaseBundle::new("older000");
        older.updated_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = CaseBundle::new("newer000");
        store.upsert(&older).unwrap();
        store.upsert(&newer).unwrap();
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.case_id).collect();
        assert_eq!(ids, vec!["newer000", "older000"]);
    }
}
