//! Receipt listing and upload handlers.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::super::auth::AuthUser;
use super::super::error::ApiError;
use super::super::AppState;
use crate::services::ImageUpload;

/// Multipart field carrying the receipt image.
pub const IMAGE_FIELD: &str = "image";

/// List every stored receipt.
pub async fn list_receipts(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let receipts = state.receipts.get_all().await.map_err(ApiError::Fetch)?;
    Ok(Json(receipts))
}

/// Accept one receipt image, OCR it, and store the result.
///
/// A request that is not `multipart/form-data` at all carries no image.
pub async fn upload_receipt(
    State(state): State<AppState>,
    AuthUser(owner): AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        tracing::debug!("Upload without multipart body: {}", rejection);
        ApiError::NoImage
    })?;
    let upload = read_image_field(multipart).await?.ok_or(ApiError::NoImage)?;
    let receipt = state.intake.ingest(&owner, upload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Pull the `image` field out of the form, ignoring everything else.
///
/// A field with neither a filename nor content is what browsers send when
/// no file was picked, so it counts as missing.
async fn read_image_field(mut multipart: Multipart) -> Result<Option<ImageUpload>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.is_empty());
        let content = field.bytes().await?;

        if file_name.is_none() && content.is_empty() {
            return Ok(None);
        }

        return Ok(Some(ImageUpload {
            file_name,
            content: content.to_vec(),
        }));
    }
    Ok(None)
}
