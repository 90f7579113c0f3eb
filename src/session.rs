use crate::camera::{Camera, CameraError};
use crate::capture_loop::{CaptureError, CaptureHandle, CaptureLoop, CaptureSettings};
use crate::detect_service::DetectionService;
use crate::live::LiveView;
use crate::notice::NoticeBoard;
use crate::telemetry::Metrics;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Camera plus capture loop as driven from the live page.
pub struct LiveSession {
    camera: Arc<Camera>,
    service: Arc<dyn DetectionService>,
    view: Arc<LiveView>,
    notices: Arc<NoticeBoard>,
    metrics: Option<Arc<Metrics>>,
    settings: CaptureSettings,
    capture: Mutex<Option<CaptureHandle>>,
}

impl LiveSession {
    pub fn new(
        camera: Arc<Camera>,
        service: Arc<dyn DetectionService>,
        view: Arc<LiveView>,
        notices: Arc<NoticeBoard>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            camera,
            service,
            view,
            notices,
            metrics: None,
            settings,
            capture: Mutex::new(None),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn camera(&self) -> &Arc<Camera> {
        &self.camera
    }

    pub fn view(&self) -> &Arc<LiveView> {
        &self.view
    }

    pub async fn start_camera(&self) -> Result<(), CameraError> {
        match self.camera.start().await {
            Ok(()) => {
                self.view.set_streaming(true);
                self.notices.info("Camera Started", "Ready for detection");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to start camera: {}", e);
                self.view.set_streaming(false);
                self.notices
                    .destructive("Camera Error", "Enable camera permission");
                Err(e)
            }
        }
    }

    /// Stops detection first, then releases the camera. The capture lock is held
    /// throughout so no loop can start in between.
    pub async fn stop_camera(&self) {
        let mut capture = self.capture.lock().await;
        if let Some(handle) = capture.take() {
            handle.stop().await;
        }
        self.camera.stop().await;
        self.view.set_streaming(false);
    }

    /// Returns the running session id; starting twice keeps the first loop.
    pub async fn start_detection(&self) -> Result<u64, CaptureError> {
        let mut capture = self.capture.lock().await;
        if let Some(handle) = capture.as_ref() {
            return Ok(handle.session());
        }

        let mut capture_loop = CaptureLoop::new(
            self.camera.clone(),
            self.service.clone(),
            self.view.clone(),
            self.settings,
        );
        if let Some(metrics) = &self.metrics {
            capture_loop = capture_loop.with_metrics(metrics.clone());
        }

        match capture_loop.start().await {
            Ok(handle) => {
                let session = handle.session();
                *capture = Some(handle);
                Ok(session)
            }
            Err(e) => {
                self.notices
                    .destructive("Camera not active", "Start camera first");
                Err(e)
            }
        }
    }

    /// Returns whether a loop was running.
    pub async fn stop_detection(&self) -> bool {
        let mut capture = self.capture.lock().await;
        match capture.take() {
            Some(handle) => {
                handle.stop().await;
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub async fn is_detecting(&self) -> bool {
        self.capture.lock().await.is_some()
    }

    pub async fn shutdown(&self) {
        self.stop_camera().await;
        tracing::info!("Live session shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::tests::{small_resolution, MockDevice};
    use crate::capture_loop::tests::{bottle_report, wait_until, MockService};
    use crate::config::ResponseOrdering;
    use crate::notice::Severity;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn session_with(device: MockDevice) -> (LiveSession, Arc<NoticeBoard>) {
        let notices = Arc::new(NoticeBoard::new(8));
        let session = LiveSession::new(
            Arc::new(Camera::new(Box::new(device), small_resolution())),
            Arc::new(MockService::new(Duration::ZERO, |_| Ok(bottle_report()))),
            Arc::new(LiveView::new(ResponseOrdering::LastArrived)),
            notices.clone(),
            CaptureSettings {
                interval: Duration::from_millis(20),
                jpeg_quality: 40,
            },
        );
        (session, notices)
    }

    #[tokio::test]
    async fn test_denied_camera_shows_notice_and_stays_off() {
        let (session, notices) = session_with(MockDevice::denied());

        let result = session.start_camera().await;

        assert!(result.is_err());
        assert!(!session.camera().is_streaming().await);
        assert!(!session.view().snapshot().streaming);
        let notice = notices.latest().unwrap();
        assert_eq!(notice.title, "Camera Error");
        assert_eq!(notice.severity, Severity::Destructive);
    }

    #[tokio::test]
    async fn test_detection_requires_camera() {
        let (session, notices) = session_with(MockDevice::working());

        let result = session.start_detection().await;

        assert!(matches!(result, Err(CaptureError::CameraNotActive)));
        assert!(!session.is_detecting().await);
        assert_eq!(notices.latest().unwrap().title, "Camera not active");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_camera_stops_detection_and_releases_device() {
        let device = MockDevice::working();
        let released = device.released.clone();
        let (session, notices) = session_with(device);

        session.start_camera().await.unwrap();
        assert_eq!(notices.latest().unwrap().title, "Camera Started");
        assert!(session.view().snapshot().streaming);

        let first = session.start_detection().await.unwrap();
        assert_eq!(session.start_detection().await.unwrap(), first);
        assert!(wait_until(|| !session.view().snapshot().detections.is_empty()).await);

        session.stop_camera().await;

        assert!(!session.is_detecting().await);
        assert!(released.load(Ordering::SeqCst));
        let snapshot = session.view().snapshot();
        assert!(!snapshot.streaming);
        assert!(!snapshot.detecting);
        assert!(snapshot.detections.is_empty());
        assert!(!session.stop_detection().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_detection_started_while_camera_stops_never_outlives_it() {
        let (session, _) = session_with(MockDevice::working());

        for _ in 0..20 {
            session.start_camera().await.unwrap();
            session.start_detection().await.unwrap();

            let (_, started) = tokio::join!(session.stop_camera(), session.start_detection());

            assert!(!session.camera().is_streaming().await);
            assert!(!session.is_detecting().await, "started: {:?}", started);
            let snapshot = session.view().snapshot();
            assert!(!snapshot.streaming);
            assert!(!snapshot.detecting);
        }
    }
}
