//! Pipeline settings and service credentials.
//!
//! Tuning values (token budgets, sampling, retry budgets, search parameters)
//! come from an optional YAML file where every key has a default. Endpoints
//! and keys come from the environment (after `.env` is loaded) and are
//! resolved once at startup, then passed into the clients.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::search::SearchMode;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Missing environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Sampling and budget parameters for one kind of chat call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub seed: Option<i64>,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            max_tokens: 3000,
            temperature: 0.0,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            seed: Some(42),
        }
    }
}

impl CompletionSettings {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Parameters of the agentic retrieval loop and its search calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub max_retries: u32,
    pub top: usize,
    pub k_nearest_neighbors: usize,
    pub vector_weight: f32,
    pub semantic_configuration: String,
    pub vector_field: String,
    pub mode: SearchMode,
    /// Ask the LLM to pick the search mode per query instead of using `mode`.
    pub classify_search_mode: bool,
    /// Per-result content cut-off when formatting results for the evaluator.
    pub content_truncate_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            top: 5,
            k_nearest_neighbors: 5,
            vector_weight: 0.5,
            semantic_configuration: "my-semantic-config".to_string(),
            vector_field: "vector".to_string(),
            mode: SearchMode::Hybrid,
            classify_search_mode: false,
            content_truncate_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeterminationSettings {
    pub completion: CompletionSettings,
    /// Attempts on the secondary chat model before the failure propagates.
    pub max_attempts: u32,
    pub reasoning_max_completion_tokens: u32,
}

impl Default for DeterminationSettings {
    fn default() -> Self {
        Self {
            completion: CompletionSettings::default().with_max_tokens(4096),
            max_attempts: 2,
            reasoning_max_completion_tokens: 15000,
        }
    }
}

/// All tuning for one pipeline instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub patient_extraction: CompletionSettings,
    pub physician_extraction: CompletionSettings,
    pub clinical_extraction: CompletionSettings,
    pub query_expansion: CompletionSettings,
    pub evaluation: CompletionSettings,
    pub summarization: CompletionSettings,
    pub determination: DeterminationSettings,
    pub retrieval: RetrievalSettings,
    /// DPI used when rendering uploaded PDF pages for extraction.
    pub render_dpi: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            patient_extraction: CompletionSettings::default(),
            physician_extraction: CompletionSettings::default(),
            clinical_extraction: CompletionSettings::default(),
            query_expansion: CompletionSettings::default().with_temperature(0.3),
            evaluation: CompletionSettings::default(),
            summarization: CompletionSettings::default().with_max_tokens(4096),
            determination: DeterminationSettings::default(),
            retrieval: RetrievalSettings::default(),
            render_dpi: 200,
        }
    }
}

impl PipelineSettings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SettingsError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, SettingsError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }
}

/// Chat deployment coordinates for one model.
#[derive(Debug, Clone)]
pub struct ChatDeployment {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

/// Search index coordinates.
#[derive(Debug, Clone)]
pub struct SearchIndexSettings {
    pub endpoint: String,
    pub index_name: String,
    pub api_key: String,
    pub api_version: String,
}

/// Service endpoints and credentials resolved from the environment.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub chat: ChatDeployment,
    /// Reasoning deployment, present when `AZURE_OPENAI_CHAT_DEPLOYMENT_01` is set.
    pub reasoning: Option<ChatDeployment>,
    pub search: SearchIndexSettings,
}

const DEFAULT_CHAT_API_VERSION: &str = "2024-08-01-preview";
const DEFAULT_REASONING_API_VERSION: &str = "2024-09-01-preview";
const DEFAULT_SEARCH_API_VERSION: &str = "2024-07-01";

impl ServiceSettings {
    /// Load `.env` (if present) and resolve all service settings.
    pub fn from_env() -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| -> Option<String> {
            lookup(name).filter(|v| !v.trim().is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(SettingsError::MissingVar(name));

        let endpoint = require("AZURE_OPENAI_ENDPOINT")?;
        let api_key = require("AZURE_OPENAI_KEY")?;

        let chat = ChatDeployment {
            endpoint: endpoint.clone(),
            api_key: api_key.clone(),
            deployment: require("AZURE_OPENAI_CHAT_DEPLOYMENT_ID")?,
            api_version: get("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_CHAT_API_VERSION.to_string()),
        };

        let reasoning = get("AZURE_OPENAI_CHAT_DEPLOYMENT_01").map(|deployment| ChatDeployment {
            endpoint,
            api_key,
            deployment,
            api_version: get("AZURE_OPENAI_API_VERSION_01")
                .unwrap_or_else(|| DEFAULT_REASONING_API_VERSION.to_string()),
        });

        let search = SearchIndexSettings {
            endpoint: require("AZURE_AI_SEARCH_SERVICE_ENDPOINT")?,
            index_name: require("AZURE_SEARCH_INDEX_NAME")?,
            api_key: require("AZURE_AI_SEARCH_ADMIN_KEY")?,
            api_version: DEFAULT_SEARCH_API_VERSION.to_string(),
        };

        Ok(Self {
            chat,
            reasoning,
            search,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_env() -> HashMap<String, String> {
        env(&[
            ("AZURE_OPENAI_ENDPOINT", "https://aoai.example.com"),
            ("AZURE_OPENAI_KEY", "key"),
            ("AZURE_OPENAI_CHAT_DEPLOYMENT_ID", "gpt-4o"),
            ("AZURE_AI_SEARCH_SERVICE_ENDPOINT", "https://search.example.com"),
            ("AZURE_SEARCH_INDEX_NAME", "policies"),
            ("AZURE_AI_SEARCH_ADMIN_KEY", "search-key"),
        ])
    }

    #[test]
    fn defaults_match_pipeline_contract() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.retrieval.max_retries, 3);
        assert_eq!(settings.retrieval.mode, SearchMode::Hybrid);
        assert!(!settings.retrieval.classify_search_mode);
        assert_eq!(settings.determination.max_attempts, 2);
        assert_eq!(settings.summarization.max_tokens, 4096);
        assert_eq!(settings.render_dpi, 200);
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let settings = PipelineSettings::from_yaml_str("").unwrap();
        assert_eq!(settings, PipelineSettings::default());
    }

    #[test]
    fn partial_yaml_overrides_only_named_keys() {
        let yaml = "retrieval:\n  max_retries: 5\n  top: 10\nquery_expansion:\n  max_tokens: 512\n";
        let settings = PipelineSettings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.retrieval.max_retries, 5);
        assert_eq!(settings.retrieval.top, 10);
        assert_eq!(settings.retrieval.k_nearest_neighbors, 5);
        assert_eq!(settings.query_expansion.max_tokens, 512);
        assert_eq!(settings.determination.max_attempts, 2);
    }

    #[test]
    fn search_mode_parses_lowercase() {
        let settings = PipelineSettings::from_yaml_str("retrieval:\n  mode: keyword\n").unwrap();
        assert_eq!(settings.retrieval.mode, SearchMode::Keyword);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let result = PipelineSettings::from_yaml_str("retrieval: [unclosed");
        assert!(matches!(result, Err(SettingsError::Parse(_))));
    }

    #[test]
    fn service_settings_resolve_without_reasoning_model() {
        let vars = full_env();
        let settings = ServiceSettings::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(settings.chat.deployment, "gpt-4o");
        assert_eq!(settings.chat.api_version, DEFAULT_CHAT_API_VERSION);
        assert!(settings.reasoning.is_none());
        assert_eq!(settings.search.index_name, "policies");
    }

    #[test]
    fn reasoning_deployment_shares_endpoint() {
        let mut vars = full_env();
        vars.insert("AZURE_OPENAI_CHAT_DEPLOYMENT_01".into(), "o1-preview".into());
        let settings = ServiceSettings::from_lookup(|k| vars.get(k).cloned()).unwrap();
        let reasoning = settings.reasoning.unwrap();
        assert_eq!(reasoning.deployment, "o1-preview");
        assert_eq!(reasoning.endpoint, "https://aoai.example.com");
        assert_eq!(reasoning.api_version, DEFAULT_REASONING_API_VERSION);
    }

    #[test]
    fn missing_variable_is_named() {
        let mut vars = full_env();
        vars.remove("AZURE_SEARCH_INDEX_NAME");
        let err = ServiceSettings::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, SettingsError::MissingVar("AZURE_SEARCH_INDEX_NAME")));
    }

    #[test]
    fn blank_variable_counts_as_missing() {
        let mut vars = full_env();
        vars.insert("AZURE_OPENAI_KEY".into(), "   ".into());
        let err = ServiceSettings::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, SettingsError::MissingVar("AZURE_OPENAI_KEY")));
    }
}
