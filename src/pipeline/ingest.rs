//! Document ingestion: uploaded files become the page images the
//! extraction stage reads.
//!
//! PDFs are rendered page by page to PNG on the blocking pool; PNG and
//! JPEG uploads are copied as-is. Everything lands in a per-case scratch
//! directory owned by the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::documents::{is_pdf, DocumentError, PageRenderer};
use crate::storage::{ArtifactStore, PROCESSED_IMAGES, RAW_UPLOADED_FILES};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Document error in {file}: {source}")]
    Document {
        file: String,
        #[source]
        source: DocumentError,
    },

    #[error("Rendering task failed: {0}")]
    Task(String),
}

/// What an uploaded file turned out to be, by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Pdf,
    Png,
    Jpeg,
    Unsupported,
}

impl UploadKind {
    pub fn detect(bytes: &[u8]) -> Self {
        if is_pdf(bytes) {
            Self::Pdf
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            Self::Png
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Self::Jpeg
        } else {
            Self::Unsupported
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> IngestError + '_ {
    move |source| IngestError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace(['/', '\\', ' '], "_"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "upload".to_string())
}

/// Turns a case's uploads into page images and mirrors both into the
/// artifact store.
pub struct DocumentIngestor {
    renderer: Arc<dyn PageRenderer>,
    artifacts: Arc<dyn ArtifactStore>,
    dpi: u32,
    case_id: String,
}

impl DocumentIngestor {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        artifacts: Arc<dyn ArtifactStore>,
        dpi: u32,
        case_id: &str,
    ) -> Self {
        Self {
            renderer,
            artifacts,
            dpi,
            case_id: case_id.to_string(),
        }
    }

    /// Copy the original uploads to the artifact store. Failures are
    /// logged and skipped; returns the references that were stored.
    pub async fn upload_raw(&self, files: &[PathBuf]) -> Vec<String> {
        self.upload_all(RAW_UPLOADED_FILES, files).await
    }

    /// Copy rendered pages to the artifact store.
    pub async fn upload_images(&self, images: &[PathBuf]) -> Vec<String> {
        self.upload_all(PROCESSED_IMAGES, images).await
    }

    async fn upload_all(&self, step: &str, files: &[PathBuf]) -> Vec<String> {
        let mut references = Vec::with_capacity(files.len());
        for file in files {
            if !file.is_file() {
                continue;
            }
            match self.artifacts.upload_file(&self.case_id, step, file).await {
                Ok(reference) => references.push(reference),
                Err(e) => {
                    tracing::warn!(
                        case_id = %self.case_id,
                        step,
                        file = %file.display(),
                        error = %e,
                        "Artifact upload failed, skipping"
                    );
                }
            }
        }
        references
    }

    /// Produce page images for every upload inside `workdir`, sorted by
    /// path. Directories and unsupported formats are skipped.
    pub async fn render(
        &self,
        files: &[PathBuf],
        workdir: &Path,
    ) -> Result<Vec<PathBuf>, IngestError> {
        let mut images = Vec::new();

        for (index, file) in files.iter().enumerate() {
            if file.is_dir() {
                tracing::warn!(case_id = %self.case_id, path = %file.display(), "Skipping directory");
                continue;
            }

            let bytes = tokio::fs::read(file).await.map_err(io_error(file))?;
            let prefix = format!("{:02}_{}", index + 1, file_stem(file));

            match UploadKind::detect(&bytes) {
                UploadKind::Pdf => {
                    let pages = self.render_pdf(file, bytes, workdir, prefix).await?;
                    tracing::info!(
                        case_id = %self.case_id,
                        file = %file.display(),
                        pages = pages.len(),
                        "Rendered PDF"
                    );
                    images.extend(pages);
                }
                kind @ (UploadKind::Png | UploadKind::Jpeg) => {
                    let extension = if kind == UploadKind::Png { "png" } else { "jpg" };
                    let target = workdir.join(format!("{prefix}.{extension}"));
                    tokio::fs::write(&target, &bytes)
                        .await
                        .map_err(io_error(&target))?;
                    images.push(target);
                }
                UploadKind::Unsupported => {
                    tracing::warn!(
                        case_id = %self.case_id,
                        file = %file.display(),
                        "Unsupported upload format, skipping"
                    );
                }
            }
        }

        images.sort();
        Ok(images)
    }

    async fn render_pdf(
        &self,
        file: &Path,
        bytes: Vec<u8>,
        workdir: &Path,
        prefix: String,
    ) -> Result<Vec<PathBuf>, IngestError> {
        let renderer = Arc::clone(&self.renderer);
        let workdir = workdir.to_path_buf();
        let dpi = self.dpi;
        let name = file.display().to_string();

        let rendered = tokio::task::spawn_blocking(move || {
            let document_error = |source| IngestError::Document {
                file: name.clone(),
                source,
            };
            let count = renderer.page_count(&bytes).map_err(document_error)?;
            let mut pages = Vec::with_capacity(count);
            for page in 0..count {
                let png = renderer
                    .render_page(&bytes, page, dpi)
                    .map_err(document_error)?;
                let target = workdir.join(format!("{prefix}_page_{:03}.png", page + 1));
                std::fs::write(&target, png).map_err(io_error(&target))?;
                pages.push(target);
            }
            Ok::<_, IngestError>(pages)
        })
        .await
        .map_err(|e| IngestError::Task(e.to_string()))??;

        Ok(rendered)
    }
}
