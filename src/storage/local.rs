use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{validate_segment, ArtifactStore, StorageError};

/// Artifact store rooted at a local directory: `<root>/<case_id>/<step>/<name>`.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(
        &self,
        case_id: &str,
        step: &str,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        validate_segment(case_id)?;
        validate_segment(step)?;
        validate_segment(name)?;

        let dir = self.root.join(case_id).join(step);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StorageError::Io {
                path: dir.display().to_string(),
                source,
            })?;

        let path = dir.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Io {
                path: path.display().to_string(),
                source,
            })?;

        tracing::debug!(case_id, step, name, "Stored case artifact");
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{PROCESSED_IMAGES, RAW_UPLOADED_FILES};

    #[tokio::test]
    async fn put_writes_under_case_and_step() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let reference = store
            .put("abc12345", PROCESSED_IMAGES, "page_1.png", vec![1, 2, 3])
            .await
            .unwrap();
        let expected = dir.path().join("abc12345").join(PROCESSED_IMAGES).join("page_1.png");
        assert_eq!(reference, expected.display().to_string());
        assert_eq!(std::fs::read(expected).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn upload_file_keeps_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("form.pdf");
        std::fs::write(&upload, b"%PDF").unwrap();
        let store = LocalArtifactStore::new(dir.path().join("store"));
        let reference = store
            .upload_file("abc12345", RAW_UPLOADED_FILES, &upload)
            .await
            .unwrap();
        assert!(reference.ends_with("form.pdf"));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let err = store.put("..", "x", "y", vec![]).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidName(_)));
    }
}
