//! Configuration management for receiptd using the prefer crate.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::repository::DbContext;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "receiptd.db";

/// Default bind address for the HTTP server.
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// Header carrying the authenticated user ID, set by the fronting auth layer.
pub const DEFAULT_USER_HEADER: &str = "x-user-id";

/// Default upload size cap (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Default number of scripts allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

const UPLOADS_SUBDIR: &str = "uploads";
const ANALYSIS_IMAGES_SUBDIR: &str = "analysis_images";
const ANALYSIS_RUNS_SUBDIR: &str = "analysis_runs";

/// How to invoke an external script.
///
/// Arguments may contain `{file}`, `{basename}` and `{stem}` placeholders,
/// which expand to the input file when the script is given one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Program to execute.
    pub command: String,
    /// Arguments, with placeholders.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory (defaults to the server's CWD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Timeout in seconds (0 = no timeout).
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    300
}

impl ScriptConfig {
    /// `python receipt_ocr.py -i {file}`
    pub fn default_ocr() -> Self {
        Self {
            command: "python".to_string(),
            args: vec![
                "receipt_ocr.py".to_string(),
                "-i".to_string(),
                "{file}".to_string(),
            ],
            working_dir: None,
            timeout_seconds: default_timeout(),
        }
    }

    /// `python expensesanalysis.py`
    pub fn default_analysis() -> Self {
        Self {
            command: "python".to_string(),
            args: vec!["expensesanalysis.py".to_string()],
            working_dir: None,
            timeout_seconds: default_timeout(),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// Directory uploaded receipt images are written to.
    pub uploads_dir: PathBuf,
    /// Directory chart images are published to.
    pub analysis_images_dir: PathBuf,
    /// Scratch directory for in-progress analysis runs (never served).
    pub analysis_runs_dir: PathBuf,
    /// Address the HTTP server binds to.
    pub bind: String,
    /// Header carrying the authenticated user ID.
    pub user_header: String,
    /// Largest accepted request body for uploads.
    pub max_upload_bytes: usize,
    /// Scripts allowed to run at once across all requests.
    pub max_concurrent_jobs: usize,
    /// OCR script invocation.
    pub ocr: ScriptConfig,
    /// Expense analysis script invocation.
    pub analysis: ScriptConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // Falls back gracefully: Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("receiptd");
        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            uploads_dir: data_dir.join(UPLOADS_SUBDIR),
            analysis_images_dir: data_dir.join(ANALYSIS_IMAGES_SUBDIR),
            analysis_runs_dir: data_dir.join(ANALYSIS_RUNS_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            bind: DEFAULT_BIND.to_string(),
            user_header: DEFAULT_USER_HEADER.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            ocr: ScriptConfig::default_ocr(),
            analysis: ScriptConfig::default_analysis(),
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Get the full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (label, dir) in [
            ("data", &self.data_dir),
            ("uploads", &self.uploads_dir),
            ("analysis images", &self.analysis_images_dir),
            ("analysis runs", &self.analysis_runs_dir),
        ] {
            tracing::debug!("Ensuring {} directory {}", label, dir.display());
            fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                )
            })?;
        }
        Ok(())
    }

    /// Create a database context using the configured database URL or path.
    pub fn create_db_context(&self) -> DbContext {
        DbContext::from_url(&self.database_url())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Uploads directory (defaults to `<data_dir>/uploads`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploads_dir: Option<String>,
    /// Chart directory (defaults to `<data_dir>/analysis_images`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_images_dir: Option<String>,
    /// Scratch directory for analysis runs (defaults to `<data_dir>/analysis_runs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_runs_dir: Option<String>,
    /// Bind address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// Authenticated user header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_header: Option<String>,
    /// Upload size cap in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_upload_bytes: Option<usize>,
    /// Concurrent script cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_jobs: Option<usize>,
    /// OCR script invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr: Option<ScriptConfig>,
    /// Expense analysis script invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ScriptConfig>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers receiptd config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("receiptd").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            // No config file found, use defaults
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Get the base directory for resolving relative paths.
    /// Returns the config file's parent directory if available, otherwise None.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    fn resolve_script(&self, script: &ScriptConfig, base_dir: &Path) -> ScriptConfig {
        let mut script = script.clone();
        script.working_dir = script
            .working_dir
            .as_ref()
            .map(|dir| self.resolve_path(&dir.to_string_lossy(), base_dir));
        script
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths (typically config file dir or CWD).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            let data_dir = self.resolve_path(data_dir, base_dir);
            let database_url = settings.database_url.take();
            *settings = Settings {
                database_url,
                ..Settings::with_data_dir(data_dir)
            };
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref dir) = self.uploads_dir {
            settings.uploads_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref dir) = self.analysis_images_dir {
            settings.analysis_images_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref dir) = self.analysis_runs_dir {
            settings.analysis_runs_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref bind) = self.bind {
            settings.bind = bind.clone();
        }
        if let Some(ref header) = self.user_header {
            settings.user_header = header.clone();
        }
        if let Some(limit) = self.max_upload_bytes {
            settings.max_upload_bytes = limit;
        }
        if let Some(jobs) = self.max_concurrent_jobs {
            settings.max_concurrent_jobs = jobs;
        }
        if let Some(ref ocr) = self.ocr {
            settings.ocr = self.resolve_script(ocr, base_dir);
        }
        if let Some(ref analysis) = self.analysis {
            settings.analysis = self.resolve_script(analysis, base_dir);
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory (--target flag).
    pub target: Option<PathBuf>,
}

/// Load config from file sources.
async fn load_file_config(options: &LoadOptions) -> Config {
    // Priority 1: Explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return match Config::load_from_path(config_path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}", e);
                Config::default()
            }
        };
    }

    // Priority 2: Auto-discover via prefer
    Config::load().await
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Read a non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = load_file_config(&options).await;

    let mut settings = Settings::default();

    // Determine base directory for resolving relative paths
    let base_dir = if options.use_cwd {
        current_dir()
    } else {
        config.base_dir().unwrap_or_else(current_dir)
    };

    config.apply_to_settings(&mut settings, &base_dir);

    // --target override takes precedence for the data directory
    if let Some(ref data) = options.target {
        let data_dir = if data.is_absolute() {
            data.clone()
        } else {
            current_dir().join(data)
        };
        settings.data_dir = data_dir.clone();
        if config.uploads_dir.is_none() {
            settings.uploads_dir = data_dir.join(UPLOADS_SUBDIR);
        }
        if config.analysis_images_dir.is_none() {
            settings.analysis_images_dir = data_dir.join(ANALYSIS_IMAGES_SUBDIR);
        }
        if config.analysis_runs_dir.is_none() {
            settings.analysis_runs_dir = data_dir.join(ANALYSIS_RUNS_SUBDIR);
        }
    }

    // DATABASE_URL environment variable takes highest precedence
    if let Some(database_url) = env_var("DATABASE_URL") {
        tracing::debug!("Using DATABASE_URL from environment: {}", database_url);
        settings.database_url = Some(database_url);
    }

    if let Some(jobs) = env_var("RECEIPTD_MAX_CONCURRENT_JOBS").and_then(|s| s.parse().ok()) {
        tracing::debug!("Using RECEIPTD_MAX_CONCURRENT_JOBS from environment: {}", jobs);
        settings.max_concurrent_jobs = jobs;
    }

    (settings, config)
}
