use crate::camera::Camera;
use crate::capture_loop::CaptureSettings;
use crate::config::Config;
use crate::detect_service::HttpDetectionService;
use crate::live::LiveView;
use crate::notice::NoticeBoard;
use crate::server::{HttpServer, SharedState};
use crate::session::LiveSession;
use crate::stream::VideoStream;
use crate::telemetry::Metrics;
use crate::upload::UploadSession;

use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let metrics = Arc::new(Metrics::new()?);
    let notices = Arc::new(NoticeBoard::new(config.notices.capacity));

    let service = Arc::new(HttpDetectionService::new(&config.detect_service));

    let camera = Arc::new(Camera::from_config(&config.camera));
    let view = Arc::new(LiveView::new(config.capture.ordering));

    let live = Arc::new(
        LiveSession::new(
            camera.clone(),
            service.clone(),
            view.clone(),
            notices.clone(),
            CaptureSettings::from(&config.capture),
        )
        .with_metrics(metrics.clone()),
    );
    let upload =
        Arc::new(UploadSession::new(service, notices.clone()).with_metrics(metrics.clone()));
    let video_stream = VideoStream::new(camera, view, config.camera.get_stream_delay_ms());

    let (shutdown_tx, _) = broadcast::channel(1);
    let state = SharedState {
        live: live.clone(),
        upload,
        notices,
        video_stream,
        metrics,
        shutdown: shutdown_tx.clone(),
    };

    let server = HttpServer::new(state, &config.server).await?;
    let server_handle = server.run(shutdown_tx.subscribe())?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    live.shutdown().await;
    let _ = shutdown_tx.send(());
    match server_handle.await {
        Ok(result) => result?,
        Err(e) => tracing::error!("Server task failed: {}", e),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
