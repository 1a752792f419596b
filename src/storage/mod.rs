pub mod local;

pub use local::*;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact name: {0}")]
    InvalidName(String),
}

/// Step names under which case artifacts are stored.
pub const RAW_UPLOADED_FILES: &str = "raw_uploaded_files";
pub const PROCESSED_IMAGES: &str = "processed_images";

/// Case-scoped artifact storage (uploaded files, rendered pages).
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` as `case_id/step/name`, returning its reference.
    async fn put(
        &self,
        case_id: &str,
        step: &str,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError>;

    /// Upload a local file under its own file name.
    async fn upload_file(
        &self,
        case_id: &str,
        step: &str,
        path: &Path,
    ) -> Result<String, StorageError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| StorageError::InvalidName(path.display().to_string()))?;
        let bytes = tokio::fs::read(path).await.map_err(|source| StorageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.put(case_id, step, &name, bytes).await
    }
}

/// Reject names that would escape the case directory.
pub fn validate_segment(segment: &str) -> Result<(), StorageError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(StorageError::InvalidName(segment.to_string()));
    }
    Ok(())
}
