use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::dtos::EnqueueResponse;
use crate::middleware::OwnerId;
use crate::models::StatementFormat;
use crate::startup::AppState;

pub const MAX_STATEMENT_BYTES: usize = 10 * 1024 * 1024;

/// Request body cap for uploads: the file plus room for multipart framing
/// and the `format` field.
pub const UPLOAD_BODY_LIMIT: usize = MAX_STATEMENT_BYTES + 64 * 1024;

/// Accepts a statement upload and queues it. Parsing happens on a worker;
/// the caller polls the returned job.
pub async fn upload_statement(
    State(state): State<AppState>,
    owner: OwnerId,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut format = StatementFormat::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("statement.csv").to_string();
                let data = field.bytes().await.map_err(|e| {
                    AppError::BadRequest(anyhow::anyhow!("Failed to read file bytes: {}", e))
                })?;
                upload = Some((file_name, data.to_vec()));
            }
            "format" => {
                let raw = field.text().await.map_err(|e| {
                    AppError::BadRequest(anyhow::anyhow!("Failed to read format field: {}", e))
                })?;
                format = raw
                    .parse()
                    .map_err(|e: String| AppError::BadRequest(anyhow::anyhow!(e)))?;
            }
            _ => {}
        }
    }

    let (file_name, data) =
        upload.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("No file uploaded")))?;

    if data.len() > MAX_STATEMENT_BYTES {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "File too large (max 10MB)"
        )));
    }

    let raw_content = String::from_utf8(data).map_err(|_| {
        AppError::BadRequest(anyhow::anyhow!("Statement must be UTF-8 text"))
    })?;

    let job_id = state
        .producer
        .enqueue_ingestion(&owner.0, &file_name, raw_content, format)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(EnqueueResponse::pending(job_id))))
}
