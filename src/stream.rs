use crate::camera::{Camera, CameraError};
use crate::imaging::{annotate, encode_jpeg, ImagingError};
use crate::live::LiveView;
use bytes::Bytes;
use image::RgbImage;
use futures::stream;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::sleep;
use tracing::instrument;

pub const FRAME_BOUNDARY: &str = "frame";
const FEED_JPEG_QUALITY: u8 = 80;

#[derive(Clone)]
pub struct VideoStream {
    pub camera: Arc<Camera>,
    pub view: Arc<LiveView>,
    pub video_stream_delay: u64,
}

#[derive(Error, Debug)]
pub enum VideoStreamError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("Imaging error: {0}")]
    Imaging(#[from] ImagingError),
    #[error("Http builder error: {0}")]
    HttpBuilderError(String),
}

impl VideoStream {
    pub fn new(camera: Arc<Camera>, view: Arc<LiveView>, video_stream_delay: u64) -> Self {
        Self {
            camera,
            view,
            video_stream_delay,
        }
    }

    /// Current frame with the live overlay painted on, as JPEG.
    pub async fn annotated_frame(&self) -> Result<Option<Vec<u8>>, VideoStreamError> {
        let Some(shared) = self.camera.current_frame().await? else {
            return Ok(None);
        };
        let mut frame = RgbImage::clone(&shared);
        let overlay = self.view.snapshot().overlay;
        annotate(&mut frame, &overlay);
        Ok(Some(encode_jpeg(&frame, FEED_JPEG_QUALITY)?))
    }

    /// MJPEG parts until the camera stops.
    #[instrument(skip(self))]
    pub fn generate_stream(self) -> impl futures::Stream<Item = Result<Bytes, VideoStreamError>> {
        stream::unfold(self, |feed| async move {
            sleep(Duration::from_millis(feed.video_stream_delay)).await;
            let result = feed.annotated_frame().await;
            match result {
                Ok(Some(frame)) => Some((Ok(mjpeg_part(&frame)), feed)),
                Ok(None) => Some((Ok(Bytes::new()), feed)),
                Err(VideoStreamError::Camera(CameraError::NotStreaming)) => {
                    tracing::debug!("Camera stopped, ending video feed");
                    None
                }
                Err(e) => {
                    tracing::error!("Error getting frame: {:?}", e);
                    Some((Err(e), feed))
                }
            }
        })
    }
}

pub fn mjpeg_part(frame: &[u8]) -> Bytes {
    let part_header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        FRAME_BOUNDARY,
        frame.len()
    );
    let mut body = part_header.into_bytes();
    body.extend_from_slice(frame);
    body.extend_from_slice(b"\r\n");
    Bytes::from(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::tests::{small_resolution, MockDevice};
    use crate::config::ResponseOrdering;
    use futures::StreamExt;

    #[test]
    fn test_mjpeg_part_layout() {
        let part = mjpeg_part(b"JPEG");

        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\nJPEG\r\n"
        );
    }

    #[tokio::test]
    async fn test_stream_yields_parts_then_ends_when_camera_stops() {
        let camera = Arc::new(Camera::new(
            Box::new(MockDevice::working()),
            small_resolution(),
        ));
        camera.start().await.unwrap();
        let view = Arc::new(LiveView::new(ResponseOrdering::LastArrived));
        let feed = VideoStream::new(camera.clone(), view, 1);
        let mut parts = Box::pin(feed.generate_stream());

        let first = parts.next().await.unwrap().unwrap();
        assert!(first.starts_with(b"--frame\r\nContent-Type: image/jpeg"));

        camera.stop().await;
        assert!(parts.next().await.is_none());
    }
}
