use crate::{
    config::ServerConfig, notice::NoticeBoard, routes::api_routes, session::LiveSession,
    stream::VideoStream, telemetry::Metrics, upload::UploadSession,
};
use axum::Router;
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{
    net::TcpListener,
    sync::broadcast::{Receiver, Sender},
    task::JoinHandle,
};

#[derive(Clone)]
pub struct SharedState {
    pub live: Arc<LiveSession>,
    pub upload: Arc<UploadSession>,
    pub notices: Arc<NoticeBoard>,
    pub video_stream: VideoStream,
    pub metrics: Arc<Metrics>,
    pub shutdown: Sender<()>,
}

pub fn build_router(state: SharedState) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(metrics_layer)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &ServerConfig) -> anyhow::Result<Self> {
        let addr = config.get_address();
        let router = build_router(state);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub fn run(
        self,
        mut shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await.ok();
                })
                .await?;
            Ok(())
        });

        Ok(server_handle)
    }
}
