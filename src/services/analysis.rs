//! Expense analysis over all stored receipts.
//!
//! The analysis script reads the database itself and renders three charts.
//! Each run gets a private chart directory outside the served image
//! directory; whatever the script writes there is moved into place under a
//! content hash, so clients never see a half-written chart and concurrent
//! runs never overwrite each other's images.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::runner::{ScriptError, ScriptRunner};
use crate::models::{AnalysisReport, ChartKind, CHART_KINDS};

/// Environment variable naming the per-run chart directory.
pub const CHART_DIR_ENV: &str = "RECEIPTD_CHART_DIR";

/// Environment variable carrying the database URL to the script.
pub const DATABASE_URL_ENV: &str = "RECEIPTD_DATABASE_URL";

/// URL prefix charts are served under.
pub const ANALYSIS_IMAGES_URL_PREFIX: &str = "/analysis_images";

/// Hex digits of the content hash kept in published chart names.
const HASH_PREFIX_LEN: usize = 12;

/// Computes aggregate statistics over stored receipts.
#[async_trait]
pub trait ExpenseAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self) -> Result<AnalysisReport, ScriptError>;
}

/// Analysis backed by an external script.
pub struct ScriptAnalyzer {
    runner: ScriptRunner,
    images_dir: PathBuf,
    runs_dir: PathBuf,
    database_url: String,
}

impl ScriptAnalyzer {
    /// `images_dir` is the served chart directory; `runs_dir` holds run
    /// directories and must not be served.
    pub fn new(
        runner: ScriptRunner,
        images_dir: PathBuf,
        runs_dir: PathBuf,
        database_url: String,
    ) -> Self {
        Self {
            runner,
            images_dir,
            runs_dir,
            database_url,
        }
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    async fn create_run_dir(&self) -> Result<tempfile::TempDir, ScriptError> {
        tokio::fs::create_dir_all(&self.images_dir)
            .await
            .map_err(ScriptError::Workspace)?;

        let runs_dir = self.runs_dir.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&runs_dir)?;
            tempfile::Builder::new().prefix("run-").tempdir_in(&runs_dir)
        })
        .await
        .map_err(|e| ScriptError::Workspace(std::io::Error::other(e)))?
        .map_err(ScriptError::Workspace)
    }

    /// Move one chart out of the run directory into the published set.
    async fn publish_chart(&self, run_dir: &Path, chart: ChartKind) -> Option<String> {
        let source = run_dir.join(chart.file_name());
        let bytes = match tokio::fs::read(&source).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read chart {}: {}", source.display(), e);
                return None;
            }
        };

        let name = hashed_chart_name(chart, &bytes);
        let target = self.images_dir.join(&name);

        // Same content already published by an earlier run.
        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::rename(&source, &target).await {
                tracing::warn!("Failed to publish chart {}: {}", target.display(), e);
                return None;
            }
        }

        Some(format!("{}/{}", ANALYSIS_IMAGES_URL_PREFIX, name))
    }
}

#[async_trait]
impl ExpenseAnalyzer for ScriptAnalyzer {
    fn name(&self) -> &str {
        self.runner.label()
    }

    async fn analyze(&self) -> Result<AnalysisReport, ScriptError> {
        let run_dir = self.create_run_dir().await?;
        let env = [
            (CHART_DIR_ENV, run_dir.path().to_string_lossy().into_owned()),
            (DATABASE_URL_ENV, self.database_url.clone()),
        ];

        let stdout = self.runner.run(None, &env).await?;
        let summary = parse_summary(&stdout).map_err(|reason| {
            tracing::warn!("Analysis script returned unusable output: {}", reason);
            ScriptError::InvalidOutput {
                command: self.runner.config().command.clone(),
                reason,
            }
        })?;

        let mut images = Vec::with_capacity(CHART_KINDS.len());
        for chart in CHART_KINDS {
            let path = match self.publish_chart(run_dir.path(), chart).await {
                Some(path) => path,
                None => legacy_chart_path(chart),
            };
            images.push(path);
        }

        remove_run_dir(run_dir).await;

        Ok(AnalysisReport { summary, images })
    }
}

async fn remove_run_dir(run_dir: tempfile::TempDir) {
    let path = run_dir.path().to_path_buf();
    match tokio::task::spawn_blocking(move || run_dir.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Parse the script's stdout; only a JSON object is accepted.
pub fn parse_summary(raw: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(|e| e.to_string())?;
    if value.is_object() {
        Ok(value)
    } else {
        Err("expected a JSON object".to_string())
    }
}

/// `<chart>-<hash12>.png`
pub fn hashed_chart_name(chart: ChartKind, content: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(content));
    format!("{}-{}.png", chart.as_str(), &digest[..HASH_PREFIX_LEN])
}

/// Fixed path used when a run did not produce the chart itself.
pub fn legacy_chart_path(chart: ChartKind) -> String {
    format!("{}/{}", ANALYSIS_IMAGES_URL_PREFIX, chart.file_name())
}

/// The three fixed chart paths, in report order.
pub fn legacy_chart_paths() -> Vec<String> {
    CHART_KINDS.iter().copied().map(legacy_chart_path).collect()
}
