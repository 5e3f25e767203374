//! HTTP API for uploading and analysing receipts.
//!
//! - `GET /` lists stored receipts
//! - `POST /` accepts a receipt image, runs OCR and stores the result
//! - `GET /analysis` runs the expense analysis over all receipts
//!
//! Uploaded images and analysis charts are served from `/uploads` and
//! `/analysis_images`.

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::{AuthConfig, AuthUser};
pub use error::ApiError;
pub use routes::create_router;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::Settings;
use crate::repository::DieselReceiptRepository;
use crate::services::{
    ExpenseAnalyzer, JobPool, ReceiptIntake, ScriptAnalyzer, ScriptOcrEngine, ScriptRunner,
};
use crate::storage::UploadStore;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub receipts: DieselReceiptRepository,
    pub intake: Arc<ReceiptIntake>,
    pub analyzer: Arc<dyn ExpenseAnalyzer>,
    pub auth: AuthConfig,
    pub uploads_dir: PathBuf,
    pub analysis_images_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl FromRef<AppState> for AuthConfig {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl AppState {
    /// Wire up the script-backed services from settings.
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        settings.ensure_directories()?;

        let ctx = settings.create_db_context();
        ctx.init_schema().await?;

        let pool = JobPool::new(settings.max_concurrent_jobs);
        let ocr = ScriptOcrEngine::new(ScriptRunner::new(
            "ocr",
            settings.ocr.clone(),
            pool.clone(),
        ));
        let analyzer = ScriptAnalyzer::new(
            ScriptRunner::new("analysis", settings.analysis.clone(), pool),
            settings.analysis_images_dir.clone(),
            settings.analysis_runs_dir.clone(),
            settings.database_url(),
        );

        let uploads = UploadStore::new(settings.uploads_dir.clone());
        let receipts = ctx.receipts();

        Ok(Self {
            intake: Arc::new(ReceiptIntake::new(uploads, Arc::new(ocr), receipts.clone())),
            receipts,
            analyzer: Arc::new(analyzer),
            auth: AuthConfig {
                user_header: settings.user_header.clone(),
            },
            uploads_dir: settings.uploads_dir.clone(),
            analysis_images_dir: settings.analysis_images_dir.clone(),
            max_upload_bytes: settings.max_upload_bytes,
        })
    }
}

/// Start the web server and run until Ctrl-C.
pub async fn serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    let state = AppState::new(settings).await?;
    let app = create_router(state);

    let addr: SocketAddr = bind.parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
