use crate::camera::{CameraDevice, CameraError, FrameSource, Resolution};
use image::RgbImage;
use opencv::{core::Mat, imgproc, prelude::*, videoio};

impl From<opencv::Error> for CameraError {
    fn from(err: opencv::Error) -> Self {
        CameraError::ReadFrameFailed(err.to_string())
    }
}

/// Local webcam opened through OpenCV's video capture.
pub struct OpenCvDevice {
    index: i32,
}

impl OpenCvDevice {
    pub fn new(index: i32) -> Self {
        Self { index }
    }
}

impl CameraDevice for OpenCvDevice {
    fn open(&self, resolution: Resolution) -> Result<Box<dyn FrameSource>, CameraError> {
        let mut capture = videoio::VideoCapture::new(self.index, videoio::CAP_ANY)
            .map_err(|e| CameraError::Unavailable(e.to_string()))?;

        // OpenCV reports a device it may not use (busy or no permission) as not opened.
        let opened = capture
            .is_opened()
            .map_err(|e| CameraError::Unavailable(e.to_string()))?;
        if !opened {
            return Err(CameraError::PermissionDenied(format!(
                "could not open video device {}",
                self.index
            )));
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, resolution.width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, resolution.height as f64)?;

        Ok(Box::new(OpenCvSource { capture }))
    }

    fn name(&self) -> String {
        format!("webcam:{}", self.index)
    }
}

struct OpenCvSource {
    capture: videoio::VideoCapture,
}

impl FrameSource for OpenCvSource {
    fn read_frame(&mut self) -> Result<Option<RgbImage>, CameraError> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&frame, &mut rgb, imgproc::COLOR_BGR2RGB)?;

        let size = rgb.size()?;
        let data = rgb.data_bytes()?.to_vec();
        RgbImage::from_raw(size.width as u32, size.height as u32, data)
            .map(Some)
            .ok_or_else(|| CameraError::ReadFrameFailed("unexpected frame layout".to_string()))
    }
}

impl Drop for OpenCvSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            tracing::warn!("Failed to release video capture: {:?}", e);
        }
    }
}
