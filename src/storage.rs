//! Storage helpers for uploaded receipt images on disk.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

/// Relative URL prefix under which uploads are referenced and served.
pub const UPLOADS_URL_PREFIX: &str = "uploads";

/// Errors writing uploads.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to create upload directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write upload '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An image that has been written to the uploads directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    /// Absolute path on disk, handed to the OCR script.
    pub path: PathBuf,
    /// Relative reference recorded on the receipt (`uploads/<name>`).
    pub url: String,
    /// Bytes written.
    pub size: u64,
}

/// Writes uploads under a single directory with generated names.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store an upload under a fresh name.
    ///
    /// The name is a random UUID plus an image extension taken from the
    /// client filename or sniffed from the content.
    pub async fn save(
        &self,
        original_filename: Option<&str>,
        content: &[u8],
    ) -> Result<StoredUpload, StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;
        let dir = tokio::fs::canonicalize(&self.dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        let name = upload_file_name(original_filename, content);
        let path = dir.join(&name);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;
        let written = async {
            file.write_all(content).await?;
            file.flush().await
        }
        .await;

        if let Err(source) = written {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(StorageError::Write { path, source });
        }

        tracing::debug!("Stored upload {} ({} bytes)", path.display(), content.len());

        Ok(StoredUpload {
            path,
            url: format!("{}/{}", UPLOADS_URL_PREFIX, name),
            size: content.len() as u64,
        })
    }
}

/// A stored upload that no receipt references yet.
///
/// Dropping it without calling [`PendingUpload::commit`] deletes the file,
/// so failed or cancelled requests leave no orphaned images behind.
#[derive(Debug)]
pub struct PendingUpload {
    upload: StoredUpload,
    committed: bool,
}

impl PendingUpload {
    pub fn new(upload: StoredUpload) -> Self {
        Self {
            upload,
            committed: false,
        }
    }

    pub fn upload(&self) -> &StoredUpload {
        &self.upload
    }

    /// Keep the file; a receipt now references it.
    pub fn commit(mut self) -> StoredUpload {
        self.committed = true;
        self.upload.clone()
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.upload.path) {
            Ok(()) => tracing::debug!("Discarded upload {}", self.upload.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to discard orphaned upload {}: {}",
                self.upload.path.display(),
                e
            ),
        }
    }
}

/// Build a fresh upload name: `<uuid>[.<ext>]`.
pub fn upload_file_name(original_filename: Option<&str>, content: &[u8]) -> String {
    let stem = uuid::Uuid::new_v4().simple().to_string();
    match image_extension(original_filename, content) {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// Pick a file extension for an uploaded image.
///
/// The client filename wins when its extension maps to an image type;
/// otherwise the content is sniffed. Anything else gets no extension.
pub fn image_extension(original_filename: Option<&str>, content: &[u8]) -> Option<String> {
    let from_name = original_filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .filter(|ext| {
            mime_guess::from_ext(ext)
                .first()
                .is_some_and(|mime| mime.type_() == mime_guess::mime::IMAGE)
        });

    from_name.or_else(|| {
        infer::get(content)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
            .map(|kind| kind.extension().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_extension_from_filename() {
        assert_eq!(image_extension(Some("receipt1.jpg"), b""), Some("jpg".into()));
        assert_eq!(image_extension(Some("SCAN.PNG"), b""), Some("png".into()));
    }

    #[test]
    fn test_extension_rejects_non_image_names() {
        assert_eq!(image_extension(Some("evil.sh"), b"#!/bin/sh"), None);
        assert_eq!(image_extension(Some("../../x"), b""), None);
        assert_eq!(image_extension(None, b"plain text"), None);
    }

    #[test]
    fn test_extension_sniffed_from_content() {
        assert_eq!(image_extension(Some("blob"), PNG_MAGIC), Some("png".into()));
        assert_eq!(image_extension(None, PNG_MAGIC), Some("png".into()));
    }

    #[test]
    fn test_file_names_are_unique() {
        let a = upload_file_name(Some("r.jpg"), b"");
        let b = upload_file_name(Some("r.jpg"), b"");
        assert_ne!(a, b);
        assert!(a.ends_with(".jpg"));
        assert_eq!(a.len(), 32 + 4);
    }

    #[tokio::test]
    async fn test_save_writes_content() {
        let dir = tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("uploads"));

        let upload = store.save(Some("receipt1.jpg"), b"fake image").await.unwrap();
        assert!(upload.path.is_absolute());
        assert!(upload.url.starts_with("uploads/"));
        assert!(upload.url.ends_with(".jpg"));
        assert_eq!(upload.size, 10);
        assert_eq!(std::fs::read(&upload.path).unwrap(), b"fake image");
    }

    #[tokio::test]
    async fn test_pending_upload_removed_on_drop() {
        let dir = tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        let upload = store.save(Some("r.png"), b"x").await.unwrap();
        let path = upload.path.clone();
        drop(PendingUpload::new(upload));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_committed_upload_is_kept() {
        let dir = tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        let upload = store.save(Some("r.png"), b"x").await.unwrap();
        let kept = PendingUpload::new(upload).commit();
        assert!(kept.path.exists());
    }

    #[tokio::test]
    async fn test_pending_upload_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        let upload = store.save(None, b"x").await.unwrap();
        std::fs::remove_file(&upload.path).unwrap();
        drop(PendingUpload::new(upload));
    }

    #[tokio::test]
    async fn test_url_matches_file_name() {
        let dir = tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        let upload = store.save(None, PNG_MAGIC).await.unwrap();
        let name = upload.path.file_name().unwrap().to_str().unwrap();
        assert_eq!(upload.url, format!("uploads/{}", name));
    }
}
