use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{PolicySearch, SearchError, SearchHit, SearchMode, SearchQuery};
use crate::settings::SearchIndexSettings;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Azure AI Search client over the REST `docs/search` endpoint.
pub struct AzureSearchClient {
    index: SearchIndexSettings,
    client: reqwest::Client,
}

impl AzureSearchClient {
    pub fn new(index: SearchIndexSettings) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| SearchError::HttpClient(e.to_string()))?;
        Ok(Self { index, client })
    }

    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.index.endpoint.trim_end_matches('/'),
            self.index.index_name,
            self.index.api_version
        )
    }
}

/// Wire body for one query.
pub(crate) fn search_body(query: &SearchQuery) -> Value {
    let mut body = json!({
        "search": query.text,
        "top": query.top,
    });

    match query.mode {
        SearchMode::Keyword => {
            body["queryType"] = json!("simple");
        }
        SearchMode::Semantic | SearchMode::Hybrid => {
            body["queryType"] = json!("semantic");
            body["semanticConfiguration"] = json!(query.semantic_configuration);
            body["captions"] = json!("extractive");
            body["answers"] = json!("extractive");
        }
    }

    if query.mode == SearchMode::Hybrid {
        body["vectorQueries"] = json!([{
            "kind": "text",
            "text": query.text,
            "k": query.k_nearest_neighbors,
            "fields": query.vector_field,
            "weight": query.vector_weight,
        }]);
    }

    body
}

#[derive(Deserialize)]
struct SearchResponse {
    value: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    chunk_id: Option<String>,
    parent_path: Option<String>,
    chunk: Option<String>,
    #[serde(rename = "@search.score")]
    score: Option<f64>,
    #[serde(rename = "@search.rerankerScore")]
    reranker_score: Option<f64>,
    #[serde(rename = "@search.captions", default)]
    captions: Option<Vec<RawCaption>>,
}

#[derive(Deserialize)]
struct RawCaption {
    text: Option<String>,
    highlights: Option<String>,
}

impl From<RawHit> for SearchHit {
    fn from(raw: RawHit) -> Self {
        let caption = raw
            .captions
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|c| {
                c.highlights
                    .filter(|h| !h.is_empty())
                    .or(c.text.filter(|t| !t.is_empty()))
            });
        SearchHit {
            id: raw.chunk_id.unwrap_or_else(|| "N/A".to_string()),
            source_path: raw.parent_path.unwrap_or_else(|| "N/A".to_string()),
            content: raw.chunk.unwrap_or_else(|| "N/A".to_string()),
            caption,
            score: raw.reranker_score.or(raw.score),
        }
    }
}

pub(crate) fn parse_search_response(body: &str) -> Result<Vec<SearchHit>, SearchError> {
    let parsed: SearchResponse =
        serde_json::from_str(body).map_err(|e| SearchError::ResponseParsing(e.to_string()))?;
    Ok(parsed.value.into_iter().map(SearchHit::from).collect())
}

#[async_trait]
impl PolicySearch for AzureSearchClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, SearchError> {
        let response = self
            .client
            .post(self.search_url())
            .header("api-key", &self.index.api_key)
            .json(&search_body(query))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    SearchError::Connection(self.index.endpoint.clone())
                } else {
                    SearchError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SearchError::ResponseParsing(e.to_string()))?;

        if !status.is_success() {
            return Err(SearchError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let hits = parse_search_response(&text)?;
        tracing::debug!(mode = query.mode.as_str(), hits = hits.len(), "Policy search complete");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RetrievalSettings;

    fn query(mode: SearchMode) -> SearchQuery {
        SearchQuery::from_settings("adalimumab crohn", mode, &RetrievalSettings::default())
    }

    #[test]
    fn keyword_body_is_plain_full_text() {
        let body = search_body(&query(SearchMode::Keyword));
        assert_eq!(body["queryType"], "simple");
        assert!(body.get("vectorQueries").is_none());
        assert!(body.get("semanticConfiguration").is_none());
    }

    #[test]
    fn semantic_body_requests_captions() {
        let body = search_body(&query(SearchMode::Semantic));
        assert_eq!(body["queryType"], "semantic");
        assert_eq!(body["semanticConfiguration"], "my-semantic-config");
        assert_eq!(body["captions"], "extractive");
        assert!(body.get("vectorQueries").is_none());
    }

    #[test]
    fn hybrid_body_adds_vector_query() {
        let body = search_body(&query(SearchMode::Hybrid));
        assert_eq!(body["queryType"], "semantic");
        let vq = &body["vectorQueries"][0];
        assert_eq!(vq["kind"], "text");
        assert_eq!(vq["k"], 5);
        assert_eq!(vq["fields"], "vector");
        assert_eq!(vq["weight"], 0.5);
        assert_eq!(body["top"], 5);
    }

    #[test]
    fn maps_response_fields_and_captions() {
        let body = r#"{"value": [
            {"chunk_id": "c1", "parent_path": "https://x/p.pdf", "chunk": "text",
             "@search.score": 1.5, "@search.rerankerScore": 3.2,
             "@search.captions": [{"text": "plain", "highlights": "<em>hi</em>"}]},
            {"chunk_id": "c2", "parent_path": "https://x/q.pdf", "chunk": "more",
             "@search.score": 0.7,
             "@search.captions": [{"text": "only text", "highlights": ""}]},
            {"@search.score": 0.1}
        ]}"#;
        let hits = parse_search_response(body).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].caption.as_deref(), Some("<em>hi</em>"));
        assert_eq!(hits[0].score, Some(3.2));
        assert_eq!(hits[1].caption.as_deref(), Some("only text"));
        assert_eq!(hits[1].score, Some(0.7));
        assert_eq!(hits[2].id, "N/A");
        assert!(hits[2].caption.is_none());
    }

    #[test]
    fn malformed_response_is_parse_error() {
        assert!(matches!(
            parse_search_response("{\"values\": []}"),
            Err(SearchError::ResponseParsing(_))
        ));
    }

    #[test]
    fn search_url_includes_index_and_version() {
        let client = AzureSearchClient::new(SearchIndexSettings {
            endpoint: "https://search.example.com/".into(),
            index_name: "policies".into(),
            api_key: "k".into(),
            api_version: "2024-07-01".into(),
        })
        .unwrap();
        assert_eq!(
            client.search_url(),
            "https://search.example.com/indexes/policies/docs/search?api-version=2024-07-01"
        );
    }
}
