use crate::server::SharedState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    streaming: bool,
    detecting: bool,
}

pub async fn healthcheck(State(state): State<SharedState>) -> Json<Status> {
    let snapshot = state.live.view().snapshot();
    Json(Status {
        status: "Available".into(),
        streaming: snapshot.streaming,
        detecting: snapshot.detecting,
    })
}
