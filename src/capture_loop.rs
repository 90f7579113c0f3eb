use crate::camera::{Camera, CameraError};
use crate::config::CaptureConfig;
use crate::detect_service::{DetectError, DetectionService, ImageUpload};
use crate::detection::DetectionReport;
use crate::imaging::{encode_jpeg, ImagingError};
use crate::live::{Applied, LiveView};
use crate::telemetry::Metrics;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::{
    sync::{oneshot, Notify},
    task::{JoinError, JoinHandle, JoinSet},
    time::{interval_at, Instant, MissedTickBehavior},
};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera is not active")]
    CameraNotActive,
}

#[derive(Error, Debug)]
enum TickError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("Imaging error: {0}")]
    Imaging(#[from] ImagingError),
    #[error("Detect error: {0}")]
    Detect(#[from] DetectError),
    #[error("Request task failed: {0}")]
    Join(String),
    #[error("Loop stopped before the request started")]
    Cancelled,
}

impl TickError {
    fn kind(&self) -> &'static str {
        match self {
            TickError::Camera(_) => "camera",
            TickError::Imaging(_) => "imaging",
            TickError::Detect(e) => e.kind(),
            TickError::Join(_) => "join",
            TickError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub interval: Duration,
    pub jpeg_quality: u8,
}

impl From<&CaptureConfig> for CaptureSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            interval: config.get_interval(),
            jpeg_quality: config.jpeg_quality,
        }
    }
}

/// Once closed, no new request can be issued. Requests admitted before the
/// close hold a pass until the service call returns.
struct IssueGate {
    state: Mutex<GateState>,
    idle: Notify,
}

struct GateState {
    open: bool,
    admitted: usize,
}

impl IssueGate {
    fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                open: true,
                admitted: 0,
            }),
            idle: Notify::new(),
        }
    }

    fn issue(&self, f: impl FnOnce()) -> bool {
        let state = self.state.lock();
        if state.open {
            f();
        }
        state.open
    }

    fn admit(self: &Arc<Self>) -> Option<GatePass> {
        let mut state = self.state.lock();
        if !state.open {
            return None;
        }
        state.admitted += 1;
        Some(GatePass { gate: self.clone() })
    }

    fn close(&self) {
        self.state.lock().open = false;
    }

    /// Resolves once every admitted request has returned.
    async fn drained(&self) {
        loop {
            let admitted = self.state.lock().admitted;
            if admitted == 0 {
                return;
            }
            self.idle.notified().await;
        }
    }
}

struct GatePass {
    gate: Arc<IssueGate>,
}

impl Drop for GatePass {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.admitted -= 1;
        if state.admitted == 0 {
            self.gate.idle.notify_one();
        }
    }
}

type RequestOutcome = (u64, Result<DetectionReport, TickError>, Duration);

/// Periodically sends camera frames for detection and paints the answers into the live view.
pub struct CaptureLoop {
    camera: Arc<Camera>,
    service: Arc<dyn DetectionService>,
    view: Arc<LiveView>,
    metrics: Option<Arc<Metrics>>,
    settings: CaptureSettings,
}

impl CaptureLoop {
    pub fn new(
        camera: Arc<Camera>,
        service: Arc<dyn DetectionService>,
        view: Arc<LiveView>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            camera,
            service,
            view,
            metrics: None,
            settings,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawns the loop. Fails without touching the live view if the camera is off.
    pub async fn start(self) -> Result<CaptureHandle, CaptureError> {
        if !self.camera.is_streaming().await {
            return Err(CaptureError::CameraNotActive);
        }

        let session = self.view.begin();
        let gate = Arc::new(IssueGate::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let view = self.view.clone();

        tracing::info!(
            "Capture loop {} started, polling every {} ms",
            session,
            self.settings.interval.as_millis()
        );
        let ticker = tokio::spawn(self.run(session, gate.clone(), shutdown_rx));

        Ok(CaptureHandle {
            session,
            gate,
            view,
            shutdown_tx: Some(shutdown_tx),
            ticker: Some(ticker),
        })
    }

    async fn run(
        self,
        session: u64,
        gate: Arc<IssueGate>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let period = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: JoinSet<RequestOutcome> = JoinSet::new();
        let mut seq: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    tracing::info!("Capture loop {} received shutdown signal", session);
                    break;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    self.handle_outcome(session, joined);
                }
                _ = ticker.tick() => {
                    seq += 1;
                    self.tick(seq, &gate, &mut in_flight).await;
                }
            }
        }

        in_flight.shutdown().await;
        tracing::info!("Capture loop {} stopped", session);
    }

    async fn tick(
        &self,
        seq: u64,
        gate: &Arc<IssueGate>,
        in_flight: &mut JoinSet<RequestOutcome>,
    ) {
        let frame = match self.camera.current_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!("No frame ready, skipping tick {}", seq);
                return;
            }
            Err(e) => {
                tracing::debug!("Skipping tick {}: {}", seq, TickError::from(e));
                return;
            }
        };

        let service = self.service.clone();
        let quality = self.settings.jpeg_quality;
        let job_gate = gate.clone();
        let issued = gate.issue(move || {
            // The frame lives only as long as this request.
            let request = tokio::task::spawn_blocking(move || {
                let started = std::time::Instant::now();
                let result = encode_jpeg(&frame, quality)
                    .map_err(TickError::from)
                    .and_then(|jpeg| {
                        // Blocking jobs may start late; a stopped loop sends nothing.
                        let _pass = job_gate.admit().ok_or(TickError::Cancelled)?;
                        service
                            .detect(&ImageUpload::jpeg_frame(jpeg))
                            .map_err(TickError::from)
                    });
                (result, started.elapsed())
            });

            in_flight.spawn(async move {
                match request.await {
                    Ok((result, elapsed)) => (seq, result, elapsed),
                    Err(e) => (seq, Err(TickError::Join(e.to_string())), Duration::ZERO),
                }
            });
        });

        if issued {
            tracing::debug!("Issued detect request {}", seq);
            if let Some(metrics) = &self.metrics {
                metrics.record_capture_tick();
            }
        }
    }

    fn handle_outcome(&self, session: u64, joined: Result<RequestOutcome, JoinError>) {
        let (seq, result, elapsed) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::warn!("Detect request task failed: {:?}", e);
                }
                return;
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_detect_duration(elapsed.as_millis() as u64, "live");
        }

        match result {
            Ok(report) => match self.view.apply(session, seq, &report) {
                Applied::Updated => {
                    tracing::debug!(
                        "Request {} returned {} detections",
                        seq,
                        report.detections.len()
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_applied_result();
                    }
                }
                Applied::Stale => tracing::debug!("Dropping stale response {}", seq),
                Applied::Inactive => tracing::debug!("Dropping response {} after stop", seq),
            },
            // Live polling never raises notices; the next tick tries again.
            Err(e) => {
                tracing::debug!("Dropping tick {}: {}", seq, e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_detect_failure("live", e.kind());
                }
            }
        }
    }
}

/// Stop handle of a running capture loop. Dropping it also stops the loop.
pub struct CaptureHandle {
    session: u64,
    gate: Arc<IssueGate>,
    view: Arc<LiveView>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl CaptureHandle {
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Returns once the timer is cancelled and no request is on the wire.
    /// Responses that arrive in the meantime are discarded.
    pub async fn stop(mut self) {
        self.gate.close();
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(ticker) = self.ticker.take() {
            if let Err(e) = ticker.await {
                tracing::warn!("Capture loop {} ended abnormally: {:?}", self.session, e);
            }
        }
        self.gate.drained().await;
        self.view.end(self.session);
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.gate.close();
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.view.end(self.session);
    }
}
