use crate::config::{CameraConfig, CameraSourceConfig};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("Camera unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to read frame: {0}")]
    ReadFrameFailed(String),
    #[error("Camera is not streaming")]
    NotStreaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// An open camera stream. Dropping it releases the underlying device.
pub trait FrameSource: Send {
    /// `Ok(None)` means no frame is ready yet.
    fn read_frame(&mut self) -> Result<Option<RgbImage>, CameraError>;
}

pub trait CameraDevice: Send + Sync + 'static {
    fn open(&self, resolution: Resolution) -> Result<Box<dyn FrameSource>, CameraError>;
    fn name(&self) -> String;
}

struct OpenStream {
    source: Box<dyn FrameSource>,
    latest: Option<(Instant, Arc<RgbImage>)>,
}

/// A camera shared by the live feed and the capture loop. Both read the same
/// cached frame until it is older than the frame interval.
pub struct Camera {
    device: Box<dyn CameraDevice>,
    resolution: Resolution,
    frame_interval: Duration,
    stream: Mutex<Option<OpenStream>>,
}

impl Camera {
    pub fn new(device: Box<dyn CameraDevice>, resolution: Resolution) -> Self {
        Self {
            device,
            resolution,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            stream: Mutex::new(None),
        }
    }

    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval;
        self
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        let resolution = Resolution {
            width: config.width,
            height: config.height,
        };
        Self::new(device_from_config(&config.source), resolution)
            .with_frame_interval(config.get_frame_interval())
    }

    /// Opens the device. Starting an already streaming camera is a no-op.
    pub async fn start(&self) -> Result<(), CameraError> {
        let mut stream = self.stream.lock().await;
        if stream.is_some() {
            return Ok(());
        }

        let source = self.device.open(self.resolution)?;
        *stream = Some(OpenStream {
            source,
            latest: None,
        });
        tracing::info!(
            "Camera {} streaming at {}x{}",
            self.device.name(),
            self.resolution.width,
            self.resolution.height
        );
        Ok(())
    }

    /// Releases the device. Returns whether a stream was open.
    pub async fn stop(&self) -> bool {
        let released = self.stream.lock().await.take().is_some();
        if released {
            tracing::info!("Camera {} released", self.device.name());
        }
        released
    }

    pub async fn is_streaming(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    /// The cached frame, or a fresh one once the cache is older than the frame interval.
    pub async fn current_frame(&self) -> Result<Option<Arc<RgbImage>>, CameraError> {
        let mut stream = self.stream.lock().await;
        let open = stream.as_mut().ok_or(CameraError::NotStreaming)?;

        if let Some((captured_at, frame)) = &open.latest {
            if captured_at.elapsed() < self.frame_interval {
                return Ok(Some(frame.clone()));
            }
        }

        match open.source.read_frame()? {
            Some(frame) => {
                let frame = Arc::new(frame);
                open.latest = Some((Instant::now(), frame.clone()));
                Ok(Some(frame))
            }
            None => Ok(open.latest.as_ref().map(|(_, frame)| frame.clone())),
        }
    }
}

pub fn device_from_config(source: &CameraSourceConfig) -> Box<dyn CameraDevice> {
    match source {
        #[cfg(feature = "opencv-camera")]
        CameraSourceConfig::Webcam { index } => {
            Box::new(crate::opencv_camera::OpenCvDevice::new(*index))
        }
        #[cfg(not(feature = "opencv-camera"))]
        CameraSourceConfig::Webcam { index } => {
            tracing::warn!(
                "Webcam {} configured but built without the opencv-camera feature",
                index
            );
            Box::new(MissingWebcam { index: *index })
        }
        CameraSourceConfig::Images { path, .. } => Box::new(ImageFolderDevice::new(path.clone())),
    }
}

#[cfg(not(feature = "opencv-camera"))]
struct MissingWebcam {
    index: i32,
}

#[cfg(not(feature = "opencv-camera"))]
impl CameraDevice for MissingWebcam {
    fn open(&self, _resolution: Resolution) -> Result<Box<dyn FrameSource>, CameraError> {
        Err(CameraError::Unavailable(format!(
            "webcam {} requires the opencv-camera feature",
            self.index
        )))
    }

    fn name(&self) -> String {
        format!("webcam:{}", self.index)
    }
}

/// Replays a still image, or every image of a directory in file-name order.
pub struct ImageFolderDevice {
    path: PathBuf,
}

impl ImageFolderDevice {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

fn io_to_camera_error(path: &Path, err: std::io::Error) -> CameraError {
    let message = format!("{}: {}", path.display(), err);
    match err.kind() {
        std::io::ErrorKind::PermissionDenied => CameraError::PermissionDenied(message),
        _ => CameraError::Unavailable(message),
    }
}

impl CameraDevice for ImageFolderDevice {
    fn open(&self, _resolution: Resolution) -> Result<Box<dyn FrameSource>, CameraError> {
        let metadata =
            std::fs::metadata(&self.path).map_err(|e| io_to_camera_error(&self.path, e))?;

        let files = if metadata.is_dir() {
            let mut files = std::fs::read_dir(&self.path)
                .map_err(|e| io_to_camera_error(&self.path, e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| is_image_file(path))
                .collect::<Vec<_>>();
            files.sort();
            files
        } else {
            vec![self.path.clone()]
        };

        if files.is_empty() {
            return Err(CameraError::Unavailable(format!(
                "no images found in {}",
                self.path.display()
            )));
        }

        Ok(Box::new(ImageFolderSource { files, next: 0 }))
    }

    fn name(&self) -> String {
        format!("images:{}", self.path.display())
    }
}

struct ImageFolderSource {
    files: Vec<PathBuf>,
    next: usize,
}

impl FrameSource for ImageFolderSource {
    fn read_frame(&mut self) -> Result<Option<RgbImage>, CameraError> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();

        let frame = image::open(path)
            .map_err(|e| CameraError::ReadFrameFailed(format!("{}: {}", path.display(), e)))?;
        Ok(Some(frame.to_rgb8()))
    }
}
