//! Receipt intake: store the image, run OCR, persist the result.

use std::sync::Arc;

use super::ocr::OcrEngine;
use super::runner::ScriptError;
use crate::models::Receipt;
use crate::repository::{DbError, DieselReceiptRepository};
use crate::storage::{PendingUpload, StorageError, UploadStore};

/// An uploaded image as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Filename the client sent, if any. Only its extension is used.
    pub file_name: Option<String>,
    pub content: Vec<u8>,
}

/// Which step of intake failed.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("failed to store upload: {0}")]
    Storage(#[from] StorageError),

    #[error("OCR failed: {0}")]
    Ocr(#[from] ScriptError),

    #[error("failed to save receipt: {0}")]
    Persist(#[from] DbError),

    #[error("receipt save task failed: {0}")]
    SaveTask(#[from] tokio::task::JoinError),
}

/// Turns uploaded images into stored receipts.
pub struct ReceiptIntake {
    uploads: UploadStore,
    ocr: Arc<dyn OcrEngine>,
    repo: DieselReceiptRepository,
}

impl ReceiptIntake {
    pub fn new(
        uploads: UploadStore,
        ocr: Arc<dyn OcrEngine>,
        repo: DieselReceiptRepository,
    ) -> Self {
        Self { uploads, ocr, repo }
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    /// Process one upload for `owner`.
    ///
    /// The image is removed again if any later step fails, so a failed
    /// request leaves neither a record nor a file behind. Once OCR has
    /// succeeded, saving runs in its own task: an insert that is already
    /// under way finishes even if the caller goes away, and the image is
    /// kept exactly when the record is written.
    pub async fn ingest(&self, owner: &str, upload: ImageUpload) -> Result<Receipt, IntakeError> {
        let stored = self
            .uploads
            .save(upload.file_name.as_deref(), &upload.content)
            .await?;
        let pending = PendingUpload::new(stored);

        let fields = self.ocr.extract(&pending.upload().path).await?;
        let receipt = Receipt::new(owner, pending.upload().url.clone(), fields);

        let repo = self.repo.clone();
        let receipt = tokio::spawn(async move {
            repo.save(&receipt).await?;
            pending.commit();
            Ok::<_, DbError>(receipt)
        })
        .await??;

        tracing::info!(
            "Stored receipt {} for {} ({} fields, {} via {})",
            receipt.id,
            receipt.owner,
            receipt.fields.len(),
            receipt.image_url,
            self.ocr.name()
        );

        Ok(receipt)
    }
}
