use std::str::FromStr;
use std::sync::Arc;

use crate::llm::{ChatRequest, LlmClient};
use crate::pipeline::prompts::{build_query_classifier_prompt, QUERY_CLASSIFIER_SYSTEM};
use crate::search::SearchMode;
use crate::settings::CompletionSettings;

/// Asks the LLM which search mode suits a query.
pub struct SearchModeClassifier {
    llm: Arc<dyn LlmClient>,
    settings: CompletionSettings,
    fallback: SearchMode,
}

impl SearchModeClassifier {
    /// `fallback` is used when the call itself fails.
    pub fn new(llm: Arc<dyn LlmClient>, settings: CompletionSettings, fallback: SearchMode) -> Self {
        Self {
            llm,
            settings,
            fallback,
        }
    }

    /// Unrecognized labels map to `Semantic`.
    pub async fn classify(&self, query: &str) -> SearchMode {
        let request = ChatRequest::new(build_query_classifier_prompt(query))
            .with_system(QUERY_CLASSIFIER_SYSTEM)
            .with_settings(self.settings.clone())
            .json();

        let reply = match self.llm.chat(request).await.and_then(|o| o.into_reply()) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, fallback = self.fallback.as_str(), "Query classification failed");
                return self.fallback;
            }
        };

        let label = match reply.body.into_json() {
            Ok(value) => value
                .get("classification")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            Err(_) => None,
        };

        match label.as_deref().map(SearchMode::from_str) {
            Some(Ok(mode)) => mode,
            _ => {
                tracing::warn!(label = ?label, "Unrecognized query classification, using semantic");
                SearchMode::Semantic
            }
        }
    }
}
