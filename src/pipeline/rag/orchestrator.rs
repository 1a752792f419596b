use std::sync::Arc;

use super::classify::SearchModeClassifier;
use super::types::{PolicyEvaluation, RagOutcome};
use super::RagError;
use crate::llm::{ChatRequest, LlmClient};
use crate::models::ClinicalRecord;
use crate::pipeline::prompts::{
    build_evaluation_prompt, build_query_expansion_prompt, EVALUATOR_SYSTEM,
    QUERY_EXPANSION_SYSTEM,
};
use crate::search::{format_search_results, PolicySearch, SearchMode, SearchQuery};
use crate::settings::PipelineSettings;

/// How one attempt of the loop ended.
#[derive(Debug)]
enum Attempt {
    EmptyQuery,
    NoResults,
    Retry(PolicyEvaluation),
    Done(RagOutcome),
}

/// Agentic retrieval loop: expand → retrieve → evaluate, retried until the
/// evaluator accepts a result set or the attempt budget runs out.
pub struct AgenticRag {
    llm: Arc<dyn LlmClient>,
    search: Arc<dyn PolicySearch>,
    settings: Arc<PipelineSettings>,
    case_id: String,
}

impl AgenticRag {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn PolicySearch>,
        settings: Arc<PipelineSettings>,
        case_id: &str,
    ) -> Self {
        Self {
            llm,
            search,
            settings,
            case_id: case_id.to_string(),
        }
    }

    /// Run the loop with the configured attempt budget. Never fails: when
    /// the budget is used up the outcome is empty.
    pub async fn run(&self, clinical: &ClinicalRecord) -> RagOutcome {
        self.run_with_budget(clinical, self.settings.retrieval.max_retries)
            .await
    }

    pub async fn run_with_budget(&self, clinical: &ClinicalRecord, max_retries: u32) -> RagOutcome {
        for attempt in 1..=max_retries {
            tracing::info!(
                case_id = %self.case_id,
                attempt,
                max_retries,
                "Starting retrieval attempt"
            );

            match self.attempt(clinical).await {
                Ok(Attempt::Done(outcome)) => {
                    tracing::info!(
                        case_id = %self.case_id,
                        attempt,
                        policies = ?outcome.policies,
                        "Evaluation accepted"
                    );
                    return outcome;
                }
                Ok(Attempt::EmptyQuery) => {
                    tracing::warn!(case_id = %self.case_id, attempt, "Query expansion returned nothing, retrying");
                }
                Ok(Attempt::NoResults) => {
                    tracing::warn!(case_id = %self.case_id, attempt, "No search results, retrying");
                }
                Ok(Attempt::Retry(evaluation)) => {
                    tracing::info!(
                        case_id = %self.case_id,
                        attempt,
                        candidates = evaluation.policies.len(),
                        "Evaluator requested retry"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        case_id = %self.case_id,
                        attempt,
                        max_retries,
                        error = %e,
                        "Retrieval attempt failed, retrying"
                    );
                }
            }
        }

        tracing::error!(
            case_id = %self.case_id,
            max_retries,
            "Retrieval budget exhausted, no policies found"
        );
        RagOutcome::exhausted()
    }

    async fn attempt(&self, clinical: &ClinicalRecord) -> Result<Attempt, RagError> {
        // Step 1: Expand
        let query = self.expand_query(clinical).await?;
        if query.is_empty() {
            return Ok(Attempt::EmptyQuery);
        }
        tracing::info!(case_id = %self.case_id, query = %query, "Expanded query");

        // Step 2: Retrieve
        let mode = self.search_mode(&query).await;
        let search_query = SearchQuery::from_settings(&query, mode, &self.settings.retrieval);
        let hits = self.search.search(&search_query).await?;
        if hits.is_empty() {
            return Ok(Attempt::NoResults);
        }
        let formatted =
            format_search_results(&hits, self.settings.retrieval.content_truncate_chars);

        // Step 3: Evaluate
        let evaluation = self.evaluate(&query, &formatted).await?;
        if evaluation.retry {
            return Ok(Attempt::Retry(evaluation));
        }

        Ok(Attempt::Done(RagOutcome {
            query: Some(query),
            policies: evaluation.policies.clone(),
            evaluation: Some(evaluation),
        }))
    }

    /// Optimized search query from the clinical record; empty when the
    /// reply carries none.
    pub async fn expand_query(&self, clinical: &ClinicalRecord) -> Result<String, RagError> {
        let request = ChatRequest::new(build_query_expansion_prompt(clinical))
            .with_system(QUERY_EXPANSION_SYSTEM)
            .with_settings(self.settings.query_expansion.clone())
            .json();

        let reply = self.llm.chat(request).await?.into_reply()?;
        let query = match reply.body.into_json() {
            Ok(value) => value
                .get("optimized_query")
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
            Err(e) => {
                tracing::warn!(case_id = %self.case_id, error = %e, "Unreadable query expansion");
                String::new()
            }
        };
        Ok(query)
    }

    async fn search_mode(&self, query: &str) -> SearchMode {
        let retrieval = &self.settings.retrieval;
        if !retrieval.classify_search_mode {
            return retrieval.mode;
        }
        SearchModeClassifier::new(
            Arc::clone(&self.llm),
            self.settings.evaluation.clone(),
            retrieval.mode,
        )
        .classify(query)
        .await
    }

    /// Evaluator verdict. An unreadable reply counts as a retry verdict.
    pub async fn evaluate(
        &self,
        query: &str,
        formatted_results: &str,
    ) -> Result<PolicyEvaluation, RagError> {
        let request = ChatRequest::new(build_evaluation_prompt(query, formatted_results))
            .with_system(EVALUATOR_SYSTEM)
            .with_settings(self.settings.evaluation.clone())
            .json();

        let reply = self.llm.chat(request).await?.into_reply()?;
        let evaluation = match reply.body.into_json() {
            Ok(value) => PolicyEvaluation::from_value(&value),
            Err(e) => {
                tracing::warn!(case_id = %self.case_id, error = %e, "Unreadable evaluation");
                PolicyEvaluation::default()
            }
        };
        Ok(evaluation)
    }
}
