use crate::{live::LiveSnapshot, routes::AppError, server::SharedState};
use axum::{extract::State, Json};
use tracing::instrument;

#[instrument(skip(state))]
pub async fn start_camera(
    State(state): State<SharedState>,
) -> Result<Json<LiveSnapshot>, AppError> {
    state.metrics.record_request("/camera/start");
    state.live.start_camera().await?;
    Ok(Json(state.live.view().snapshot()))
}

#[instrument(skip(state))]
pub async fn stop_camera(State(state): State<SharedState>) -> Json<LiveSnapshot> {
    state.metrics.record_request("/camera/stop");
    state.live.stop_camera().await;
    Json(state.live.view().snapshot())
}
