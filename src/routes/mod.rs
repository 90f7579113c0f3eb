mod camera;
mod detection;
mod error;
mod health;
mod metrics;
mod notices;
mod upload;
mod video_feed;

use crate::server::SharedState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

pub use error::AppError;

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/video_feed", get(video_feed::video_feed))
        .route("/camera/start", post(camera::start_camera))
        .route("/camera/stop", post(camera::stop_camera))
        .route("/detection", get(detection::detection_snapshot))
        .route("/detection/start", post(detection::start_detection))
        .route("/detection/stop", post(detection::stop_detection))
        .route("/detection/events", get(detection::detection_events))
        .route("/upload", get(upload::upload_state))
        .route(
            "/upload/file",
            post(upload::select_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/upload/preview", get(upload::preview))
        .route("/upload/analyze", post(upload::analyze))
        .route("/notices", get(notices::list_notices))
}

#[cfg(test)]
mod tests {
    use crate::camera::tests::{small_resolution, MockDevice};
    use crate::camera::Camera;
    use crate::capture_loop::tests::{bottle_report, MockService};
    use crate::capture_loop::CaptureSettings;
    use crate::config::ResponseOrdering;
    use crate::detect_service::{encode_multipart, ImageUpload};
    use crate::live::LiveView;
    use crate::notice::NoticeBoard;
    use crate::server::{build_router, SharedState};
    use crate::session::LiveSession;
    use crate::stream::VideoStream;
    use crate::telemetry::Metrics;
    use crate::upload::UploadSession;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use futures::StreamExt;
    use serde_json::Value;
    use std::{sync::Arc, time::Duration};
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    fn state_with(device: MockDevice) -> SharedState {
        let metrics = Arc::new(Metrics::new().unwrap());
        let notices = Arc::new(NoticeBoard::new(8));
        let service = Arc::new(MockService::new(Duration::ZERO, |_| Ok(bottle_report())));
        let camera = Arc::new(Camera::new(Box::new(device), small_resolution()));
        let view = Arc::new(LiveView::new(ResponseOrdering::LastArrived));

        let live = LiveSession::new(
            camera.clone(),
            service.clone(),
            view.clone(),
            notices.clone(),
            CaptureSettings {
                interval: Duration::from_millis(20),
                jpeg_quality: 40,
            },
        );
        let upload = UploadSession::new(service, notices.clone());

        SharedState {
            live: Arc::new(live),
            upload: Arc::new(upload),
            notices,
            video_stream: VideoStream::new(camera, view, 10),
            metrics,
            shutdown: broadcast::channel(1).0,
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post(uri: &str) -> Request<Body> {
        Request::post(uri).body(Body::empty()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn multipart_request(upload: &ImageUpload) -> Request<Body> {
        let boundary = "test-boundary";
        Request::post("/upload/file")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(encode_multipart(boundary, "file", upload)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let router = build_router(state_with(MockDevice::working()));

        let (status, body) = send(&router, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Available");
        assert_eq!(body["streaming"], false);
    }

    #[tokio::test]
    async fn test_analyze_without_file_is_bad_request() {
        let router = build_router(state_with(MockDevice::working()));

        let (status, body) = send(&router, post("/upload/analyze")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Upload error: No file selected");
    }

    #[tokio::test]
    async fn test_denied_camera_reports_unavailable_and_notice() {
        let router = build_router(state_with(MockDevice::denied()));

        let (status, _) = send(&router, post("/camera/start")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, notices) = send(&router, get("/notices")).await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<&str> = notices
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|n| n["title"].as_str())
            .collect();
        assert!(titles.contains(&"Camera Error"));
    }

    #[tokio::test]
    async fn test_detection_start_without_camera_conflicts() {
        let router = build_router(state_with(MockDevice::working()));

        let (status, _) = send(&router, post("/detection/start")).await;

        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_video_feed_requires_camera() {
        let router = build_router(state_with(MockDevice::working()));

        let (status, _) = send(&router, get("/video_feed")).await;

        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_camera_and_detection_lifecycle() {
        let state = state_with(MockDevice::working());
        let live = state.live.clone();
        let router = build_router(state);

        let (status, snapshot) = send(&router, post("/camera/start")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["streaming"], true);

        let (status, snapshot) = send(&router, post("/detection/start")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["detecting"], true);

        let (status, snapshot) = send(&router, post("/camera/stop")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["streaming"], false);
        assert_eq!(snapshot["detecting"], false);
        assert!(!live.is_detecting().await);
    }

    #[tokio::test]
    async fn test_upload_select_preview_and_analyze() {
        let router = build_router(state_with(MockDevice::working()));
        let png = tiny_png();
        let upload = ImageUpload::new("bottle.png", "image/png", png.clone().into());

        let (status, state) = send(&router, multipart_request(&upload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state["file_name"], "bottle.png");
        assert_eq!(state["can_analyze"], true);

        let response = router.clone().oneshot(get("/upload/preview")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes.as_ref(), png.as_slice());

        let (status, report) = send(&router, post("/upload/analyze")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["totalItems"], 1);
        assert_eq!(report["detections"][0]["category"], "plastic_bottle");

        let (_, state) = send(&router, get("/upload")).await;
        assert_eq!(state["results"]["totalItems"], 1);
    }

    #[tokio::test]
    async fn test_detection_events_stream_snapshots() {
        let router = build_router(state_with(MockDevice::working()));

        let response = router
            .clone()
            .oneshot(get("/detection/events"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();

        assert!(text.starts_with("event: snapshot\n"), "{}", text);
        let data = text
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        let snapshot: Value = serde_json::from_str(data).unwrap();
        assert_eq!(snapshot["streaming"], false);
        assert_eq!(snapshot["message"], "Start detection");
    }

    #[tokio::test]
    async fn test_upload_rejects_non_image() {
        let router = build_router(state_with(MockDevice::working()));
        let upload = ImageUpload::new("notes.txt", "text/plain", "hello".into());

        let (status, _) = send(&router, multipart_request(&upload)).await;

        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_preview_without_selection_is_not_found() {
        let router = build_router(state_with(MockDevice::working()));

        let (status, _) = send(&router, get("/upload/preview")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
