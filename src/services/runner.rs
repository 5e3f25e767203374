//! Bounded execution of external scripts.
//!
//! Every script invocation goes through a [`ScriptRunner`], which expands
//! placeholders, enforces the configured timeout, and holds a permit from
//! the shared [`JobPool`] for as long as the child runs.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ScriptConfig;

/// Lines of stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 5;

/// Errors from running a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running '{command}': {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("'{command}' timed out after {seconds}s")]
    TimedOut { command: String, seconds: u64 },

    #[error("'{command}' produced invalid output: {reason}")]
    InvalidOutput { command: String, reason: String },

    #[error("job pool is closed")]
    PoolClosed,

    #[error("failed to prepare workspace: {0}")]
    Workspace(#[source] std::io::Error),
}

impl ScriptError {
    /// The script ran to completion but its output was unusable.
    pub fn is_output_error(&self) -> bool {
        matches!(self, Self::InvalidOutput { .. })
    }
}

/// Caps how many scripts run at once across all requests.
#[derive(Debug, Clone)]
pub struct JobPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl JobPool {
    /// Create a pool; a size of zero is treated as one.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ScriptError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ScriptError::PoolClosed)
    }
}

impl Default for JobPool {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_CONCURRENT_JOBS)
    }
}

/// Runs one configured script.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    label: String,
    config: ScriptConfig,
    pool: JobPool,
}

impl ScriptRunner {
    pub fn new(label: impl Into<String>, config: ScriptConfig, pool: JobPool) -> Self {
        Self {
            label: label.into(),
            config,
            pool,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Replace placeholders in argument string.
    fn expand_arg(arg: &str, file_path: &Path) -> String {
        let mut result = arg.replace("{file}", &file_path.to_string_lossy());
        if let Some(basename) = file_path.file_name().and_then(|n| n.to_str()) {
            result = result.replace("{basename}", basename);
        }
        if let Some(stem) = file_path.file_stem().and_then(|n| n.to_str()) {
            result = result.replace("{stem}", stem);
        }
        result
    }

    /// Build command arguments with placeholders expanded.
    pub fn build_args(&self, file_path: Option<&Path>) -> Vec<String> {
        match file_path {
            Some(path) => self
                .config
                .args
                .iter()
                .map(|arg| Self::expand_arg(arg, path))
                .collect(),
            None => self.config.args.clone(),
        }
    }

    /// Whether the configured command can be found.
    pub fn is_available(&self) -> bool {
        let command = Path::new(&self.config.command);
        if command.components().count() > 1 {
            let resolved = match &self.config.working_dir {
                Some(dir) if command.is_relative() => dir.join(command),
                _ => command.to_path_buf(),
            };
            return resolved.is_file();
        }
        which::which(&self.config.command).is_ok()
    }

    pub fn availability_hint(&self) -> String {
        format!("Install or add to PATH: {}", self.config.command)
    }

    /// Run the script and return its stdout.
    ///
    /// Waits for a pool slot first. The child is killed if it outlives the
    /// timeout or if the returned future is dropped.
    pub async fn run(
        &self,
        file_path: Option<&Path>,
        env: &[(&str, String)],
    ) -> Result<String, ScriptError> {
        let _permit = self.pool.acquire().await?;

        let args = self.build_args(file_path);
        let command = self.config.command.clone();

        let mut cmd = Command::new(&command);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in env {
            cmd.env(key, value);
        }

        tracing::debug!("Running {} script: {} {:?}", self.label, command, args);

        let child = cmd.spawn().map_err(|source| ScriptError::Spawn {
            command: command.clone(),
            source,
        })?;

        let output = match self.config.timeout_seconds {
            0 => child.wait_with_output().await,
            seconds => {
                match tokio::time::timeout(Duration::from_secs(seconds), child.wait_with_output())
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            "{} script '{}' timed out after {}s",
                            self.label,
                            command,
                            seconds
                        );
                        return Err(ScriptError::TimedOut { command, seconds });
                    }
                }
            }
        }
        .map_err(|source| ScriptError::Io {
            command: command.clone(),
            source,
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            tracing::warn!(
                "{} script '{}' failed ({}): {}",
                self.label,
                command,
                output.status,
                stderr.trim()
            );
            return Err(ScriptError::Failed {
                command,
                status: output.status.to_string(),
                stderr: tail_lines(&stderr, STDERR_TAIL_LINES),
            });
        }

        if !stderr.trim().is_empty() {
            tracing::debug!("{} script stderr: {}", self.label, stderr.trim());
        }

        String::from_utf8(output.stdout).map_err(|e| ScriptError::InvalidOutput {
            command,
            reason: format!("stdout is not UTF-8: {}", e),
        })
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}
