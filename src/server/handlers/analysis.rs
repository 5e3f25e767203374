//! Expense analysis handler.

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::Value;

use super::super::auth::AuthUser;
use super::super::error::ApiError;
use super::super::AppState;
use crate::models::Receipt;

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub receipts: Vec<Receipt>,
    pub analysis: Value,
    pub images: Vec<String>,
}

/// Run the analysis script and return its summary with the stored receipts.
pub async fn expense_analysis(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let receipts = state.receipts.get_all().await.map_err(ApiError::Fetch)?;
    let report = state.analyzer.analyze().await.map_err(ApiError::Analysis)?;

    tracing::debug!(
        "Analysis via {} over {} receipts",
        state.analyzer.name(),
        receipts.len()
    );

    Ok(Json(AnalysisResponse {
        receipts,
        analysis: report.summary,
        images: report.images,
    }))
}
