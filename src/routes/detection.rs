use crate::{live::LiveSnapshot, routes::AppError, server::SharedState};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::WatchStream;
use tracing::instrument;

#[instrument(skip(state))]
pub async fn start_detection(
    State(state): State<SharedState>,
) -> Result<Json<LiveSnapshot>, AppError> {
    state.metrics.record_request("/detection/start");
    state.live.start_detection().await?;
    Ok(Json(state.live.view().snapshot()))
}

#[instrument(skip(state))]
pub async fn stop_detection(State(state): State<SharedState>) -> Json<LiveSnapshot> {
    state.metrics.record_request("/detection/stop");
    state.live.stop_detection().await;
    Json(state.live.view().snapshot())
}

pub async fn detection_snapshot(State(state): State<SharedState>) -> Json<LiveSnapshot> {
    state.metrics.record_request("/detection");
    Json(state.live.view().snapshot())
}

/// Pushes a snapshot whenever the overlay, list or status changes. Ends on shutdown.
pub async fn detection_events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    state.metrics.record_request("/detection/events");
    let mut shutdown_rx = state.shutdown.subscribe();
    let stream = WatchStream::new(state.live.view().subscribe())
        .map(|snapshot| {
            let event = Event::default()
                .event("snapshot")
                .json_data(&snapshot)
                .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
            Ok::<_, Infallible>(event)
        })
        .take_until(async move {
            shutdown_rx.recv().await.ok();
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
