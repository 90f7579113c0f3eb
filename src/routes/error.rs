use crate::camera::CameraError;
use crate::capture_loop::CaptureError;
use crate::upload::UploadError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),
    #[error("Invalid multipart body: {0}")]
    Multipart(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Camera(CameraError::NotStreaming) => StatusCode::CONFLICT,
            AppError::Camera(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Capture(CaptureError::CameraNotActive) => StatusCode::CONFLICT,
            AppError::Upload(UploadError::NoFileSelected)
            | AppError::Upload(UploadError::EmptyFile)
            | AppError::Multipart(_) => StatusCode::BAD_REQUEST,
            AppError::Upload(UploadError::AnalysisInProgress) => StatusCode::CONFLICT,
            AppError::Upload(UploadError::NotAnImage(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Upload(UploadError::Detect(_)) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Upload(UploadError::Detect(e)) => e.user_message(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}
