//! Receipt OCR.

use std::path::Path;

use async_trait::async_trait;

use super::runner::{ScriptError, ScriptRunner};
use crate::models::OcrFields;

/// Extracts structured fields from a receipt image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Engine identifier for logs.
    fn name(&self) -> &str;

    /// Extract fields from the image at `image`.
    async fn extract(&self, image: &Path) -> Result<OcrFields, ScriptError>;
}

/// OCR backed by an external script that prints a JSON object on stdout.
pub struct ScriptOcrEngine {
    runner: ScriptRunner,
}

impl ScriptOcrEngine {
    pub fn new(runner: ScriptRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }
}

#[async_trait]
impl OcrEngine for ScriptOcrEngine {
    fn name(&self) -> &str {
        self.runner.label()
    }

    async fn extract(&self, image: &Path) -> Result<OcrFields, ScriptError> {
        let stdout = self.runner.run(Some(image), &[]).await?;

        OcrFields::parse(&stdout).map_err(|e| {
            tracing::warn!(
                "OCR script returned unusable output for {}: {}",
                image.display(),
                e
            );
            ScriptError::InvalidOutput {
                command: self.runner.config().command.clone(),
                reason: e.to_string(),
            }
        })
    }
}
