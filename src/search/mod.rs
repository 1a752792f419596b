pub mod azure;
pub mod memory;

pub use azure::*;
pub use memory::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::RetrievalSettings;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search service unreachable at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Search service returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Unknown search mode: {0}")]
    UnknownMode(String),
}

/// How the index is queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Full-text only.
    Keyword,
    /// Full-text with semantic reranking and captions.
    Semantic,
    /// Semantic reranking over full-text plus a vectorized query.
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(SearchMode::Keyword),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(SearchError::UnknownMode(other.to_string())),
        }
    }
}

/// One query against the policy index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub mode: SearchMode,
    pub top: usize,
    pub k_nearest_neighbors: usize,
    pub vector_weight: f32,
    pub semantic_configuration: String,
    pub vector_field: String,
}

impl SearchQuery {
    pub fn from_settings(text: &str, mode: SearchMode, settings: &RetrievalSettings) -> Self {
        Self {
            text: text.to_string(),
            mode,
            top: settings.top,
            k_nearest_neighbors: settings.k_nearest_neighbors,
            vector_weight: settings.vector_weight,
            semantic_configuration: settings.semantic_configuration.clone(),
            vector_field: settings.vector_field.clone(),
        }
    }
}

/// One indexed policy chunk, in the order the service ranked it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub source_path: String,
    pub content: String,
    pub caption: Option<String>,
    pub score: Option<f64>,
}

/// Policy index search backend.
#[async_trait]
pub trait PolicySearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, SearchError>;
}

const RULE: &str = "========================================";

/// Render hits as the text block the evaluator reads. Content longer than
/// `truncate` characters is cut and suffixed with `...`.
pub fn format_search_results(hits: &[SearchHit], truncate: usize) -> String {
    hits.iter()
        .map(|hit| {
            let content = if hit.content.chars().count() > truncate {
                let cut: String = hit.content.chars().take(truncate).collect();
                format!("{cut}...")
            } else {
                hit.content.clone()
            };
            let caption = hit
                .caption
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or("Caption not available");
            format!(
                "{RULE}\nID: {}\nSource Doc Path: {}\nContent: {}\nCaption: {}\n{RULE}",
                hit.id, hit.source_path, content, caption
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
