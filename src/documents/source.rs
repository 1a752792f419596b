use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{is_pdf, DocumentError, PageRenderer, PolicySource};

const FETCH_TIMEOUT_SECS: u64 = 120;

/// Fetches policy documents over HTTP(S) or from the local filesystem and
/// converts them to text. PDFs go through the renderer's text layer, other
/// content is read as UTF-8.
pub struct DocumentPolicySource {
    renderer: Arc<dyn PageRenderer>,
    client: reqwest::Client,
}

impl DocumentPolicySource {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Result<Self, DocumentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| DocumentError::Fetch {
                reference: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { renderer, client })
    }

    async fn fetch_bytes(&self, reference: &str) -> Result<Vec<u8>, DocumentError> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            let fetch_err = |reason: String| DocumentError::Fetch {
                reference: reference.to_string(),
                reason,
            };
            let response = self
                .client
                .get(reference)
                .send()
                .await
                .map_err(|e| fetch_err(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(fetch_err(format!("status {}", status.as_u16())));
            }
            let bytes = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
            Ok(bytes.to_vec())
        } else {
            let path = reference.strip_prefix("file://").unwrap_or(reference);
            tokio::fs::read(path).await.map_err(|source| DocumentError::Io {
                path: path.to_string(),
                source,
            })
        }
    }
}

#[async_trait]
impl PolicySource for DocumentPolicySource {
    async fn fetch_text(&self, reference: &str) -> Result<String, DocumentError> {
        let bytes = self.fetch_bytes(reference).await?;

        let text = if is_pdf(&bytes) {
            let renderer = Arc::clone(&self.renderer);
            tokio::task::spawn_blocking(move || renderer.extract_text(&bytes))
                .await
                .map_err(|e| DocumentError::Task(e.to_string()))??
        } else {
            String::from_utf8_lossy(&bytes).trim().to_string()
        };

        if text.trim().is_empty() {
            return Err(DocumentError::EmptyText(reference.to_string()));
        }
        tracing::debug!(reference, chars = text.len(), "Policy text resolved");
        Ok(text)
    }
}

/// Policy texts held in memory, keyed by reference. For testing.
#[derive(Default)]
pub struct InMemoryPolicySource {
    texts: HashMap<String, String>,
}

impl InMemoryPolicySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, reference: &str, text: &str) -> Self {
        self.texts.insert(reference.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl PolicySource for InMemoryPolicySource {
    async fn fetch_text(&self, reference: &str) -> Result<String, DocumentError> {
        match self.texts.get(reference) {
            Some(text) if !text.trim().is_empty() => Ok(text.clone()),
            Some(_) => Err(DocumentError::EmptyText(reference.to_string())),
            None => Err(DocumentError::Fetch {
                reference: reference.to_string(),
                reason: "unknown policy".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::MockPageRenderer;
    use std::io::Write;

    fn source(text: &str) -> DocumentPolicySource {
        DocumentPolicySource::new(Arc::new(MockPageRenderer::new(1).with_text(text))).unwrap()
    }

    #[tokio::test]
    async fn reads_plain_text_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  Humira criteria: step therapy required.  ").unwrap();
        let text = source("")
            .fetch_text(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(text, "Humira criteria: step therapy required.");
    }

    #[tokio::test]
    async fn pdf_goes_through_renderer_text_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.7 binary").unwrap();
        let reference = format!("file://{}", file.path().display());
        let text = source("extracted policy").fetch_text(&reference).await.unwrap();
        assert_eq!(text, "extracted policy");
    }

    #[tokio::test]
    async fn empty_pdf_text_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.7").unwrap();
        let err = source("   ")
            .fetch_text(file.path().to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::EmptyText(_)));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = source("").fetch_text("/nonexistent/policy.pdf").await.unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }

    #[tokio::test]
    async fn in_memory_source_resolves_known_references() {
        let source = InMemoryPolicySource::new().with_policy("p1", "text");
        assert_eq!(source.fetch_text("p1").await.unwrap(), "text");
        assert!(source.fetch_text("p2").await.is_err());
    }
}
