use crate::{
    camera::CameraError,
    routes::AppError,
    server::SharedState,
    stream::{VideoStreamError, FRAME_BOUNDARY},
};
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::Response,
};
use tracing::instrument;

#[instrument(skip(state))]
pub async fn video_feed(State(state): State<SharedState>) -> Result<Response, AppError> {
    state.metrics.record_request("/video_feed");
    if !state.live.camera().is_streaming().await {
        return Err(AppError::Camera(CameraError::NotStreaming));
    }

    let stream = state.video_stream.clone().generate_stream();
    let body = Body::from_stream(stream);

    let response = Response::builder()
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", FRAME_BOUNDARY),
        )
        .body(body)
        .map_err(|e| VideoStreamError::HttpBuilderError(e.to_string()))?;

    Ok(response)
}

impl From<VideoStreamError> for AppError {
    fn from(err: VideoStreamError) -> Self {
        match err {
            VideoStreamError::Camera(e) => AppError::Camera(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}
