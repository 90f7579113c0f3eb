use crate::{
    detect_service::ImageUpload,
    detection::DetectionReport,
    routes::AppError,
    server::SharedState,
    upload::{UploadError, UploadState},
};
use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use tracing::instrument;

const FILE_FIELD: &str = "file";

pub async fn upload_state(State(state): State<SharedState>) -> Json<UploadState> {
    state.metrics.record_request("/upload");
    Json(state.upload.state())
}

/// Takes the `file` part of a multipart body as the selected image.
#[instrument(skip(state, multipart))]
pub async fn select_file(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<UploadState>, AppError> {
    state.metrics.record_request("/upload/file");

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Multipart(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let declared_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Multipart(e.to_string()))?;
        let content_type = resolve_content_type(declared_type, &data);

        let selected = state
            .upload
            .select(ImageUpload::new(file_name, content_type, data))?;
        return Ok(Json(selected));
    }

    Err(UploadError::NoFileSelected.into())
}

/// Browsers sometimes send images as `application/octet-stream`; sniff those.
fn resolve_content_type(declared: Option<String>, data: &[u8]) -> String {
    match declared {
        Some(content_type) if content_type != "application/octet-stream" => content_type,
        _ => image::guess_format(data)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_else(|_| "application/octet-stream".to_string()),
    }
}

pub async fn preview(State(state): State<SharedState>) -> Result<Response, AppError> {
    state.metrics.record_request("/upload/preview");
    let upload = state
        .upload
        .preview()
        .ok_or(AppError::NotFound("selected image"))?;

    Ok(([(header::CONTENT_TYPE, upload.content_type)], upload.data).into_response())
}

#[instrument(skip(state))]
pub async fn analyze(State(state): State<SharedState>) -> Result<Json<DetectionReport>, AppError> {
    state.metrics.record_request("/upload/analyze");
    let report = state.upload.analyze().await?;
    Ok(Json(report))
}
