//! HTTP error responses.
//!
//! Every failure is answered with `{"error": "<message>"}`. Server-side
//! failures are logged with their cause; clients only see the fixed message.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::repository::DbError;
use crate::services::{IntakeError, ScriptError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not authorized")]
    Unauthorized,

    #[error("No image uploaded")]
    NoImage,

    #[error("malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error("failed to fetch receipts: {0}")]
    Fetch(#[source] DbError),

    #[error("analysis failed: {0}")]
    Analysis(#[source] ScriptError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NoImage => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::Intake(_) | Self::Fetch(_) | Self::Analysis(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message sent to the client.
    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized => "Not authorized".to_string(),
            Self::NoImage => "No image uploaded".to_string(),
            Self::Multipart(e) => e.body_text(),
            Self::Intake(IntakeError::Ocr(e)) if e.is_output_error() => {
                "OCR output was not valid JSON".to_string()
            }
            Self::Intake(IntakeError::Ocr(_)) => "OCR processing failed".to_string(),
            Self::Intake(IntakeError::Storage(_))
            | Self::Intake(IntakeError::Persist(_))
            | Self::Intake(IntakeError::SaveTask(_)) => "Failed to save receipt".to_string(),
            Self::Fetch(_) => "Failed to fetch receipts".to_string(),
            Self::Analysis(e) if e.is_output_error() => "Invalid analysis output".to_string(),
            Self::Analysis(_) => "Expense analysis failed".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}
