use crate::{notice::Notice, server::SharedState};
use axum::{extract::State, Json};

pub async fn list_notices(State(state): State<SharedState>) -> Json<Vec<Notice>> {
    state.metrics.record_request("/notices");
    Json(state.notices.recent())
}
