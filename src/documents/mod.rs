pub mod pdfium;
pub mod source;

pub use pdfium::*;
pub use source::*;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch {reference}: {reason}")]
    Fetch { reference: String, reason: String },

    #[error("No text could be extracted from {0}")]
    EmptyText(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Renders and reads PDF documents. Implementations are blocking; async
/// callers run them on the blocking pool.
pub trait PageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, DocumentError>;

    /// Render one zero-based page to PNG bytes.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, DocumentError>;

    /// Concatenated text layer of every page.
    fn extract_text(&self, pdf_bytes: &[u8]) -> Result<String, DocumentError>;
}

/// Resolves a policy reference (URL or path) to plain text.
#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn fetch_text(&self, reference: &str) -> Result<String, DocumentError>;
}

/// PDF magic bytes.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_magic() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(!is_pdf(b"plain text policy"));
        assert!(!is_pdf(b""));
    }
}
