use crate::config::DetectServiceConfig;
use crate::detection::DetectionReport;
use bytes::Bytes;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";
const FRAME_FILE_NAME: &str = "frame.jpg";
const GENERIC_SERVICE_MESSAGE: &str = "Backend returned an error.";
const TRANSPORT_MESSAGE: &str = "Cannot reach backend.";

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Failed to reach detection service: {0}")]
    Transport(String),
    #[error("Detection service returned status {status}")]
    Status {
        status: u16,
        message: Option<String>,
    },
    #[error("Detection service reported an error: {0}")]
    Service(String),
    #[error("Malformed detection response: {0}")]
    MalformedBody(String),
}

impl DetectError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DetectError::Transport(_) => "transport",
            DetectError::Status { .. } => "status",
            DetectError::Service(_) => "service",
            DetectError::MalformedBody(_) => "malformed",
        }
    }

    pub fn notice_title(&self) -> &'static str {
        match self {
            DetectError::Transport(_) => "Network Error",
            _ => "Analysis Failed",
        }
    }

    /// Text shown to the user: the service's own message when it sent one.
    pub fn user_message(&self) -> String {
        match self {
            DetectError::Transport(_) => TRANSPORT_MESSAGE.to_string(),
            DetectError::Status {
                message: Some(message),
                ..
            } => message.clone(),
            DetectError::Service(message) => message.clone(),
            DetectError::Status { message: None, .. } | DetectError::MalformedBody(_) => {
                GENERIC_SERVICE_MESSAGE.to_string()
            }
        }
    }
}

/// An image file as it is sent to the detect endpoint.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    pub fn jpeg_frame(data: Vec<u8>) -> Self {
        Self::new(FRAME_FILE_NAME, JPEG_CONTENT_TYPE, Bytes::from(data))
    }
}

/// Remote inference. Implementations block; callers run them on the blocking pool.
pub trait DetectionService: Send + Sync + 'static {
    fn detect(&self, upload: &ImageUpload) -> Result<DetectionReport, DetectError>;
}

pub struct HttpDetectionService {
    agent: ureq::Agent,
    url: String,
    field_name: String,
}

impl HttpDetectionService {
    pub fn new(config: &DetectServiceConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.get_timeout())
            .build();
        tracing::info!("Detection service endpoint: {}", config.url);

        Self {
            agent,
            url: config.url.clone(),
            field_name: config.field_name.clone(),
        }
    }
}

impl DetectionService for HttpDetectionService {
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, bytes = upload.data.len()))]
    fn detect(&self, upload: &ImageUpload) -> Result<DetectionReport, DetectError> {
        let boundary = new_boundary();
        let body = encode_multipart(&boundary, &self.field_name, upload);
        let started = Instant::now();

        let result = self
            .agent
            .post(&self.url)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body);

        let (status, text) = match result {
            Ok(response) => {
                let status = response.status();
                let text = response
                    .into_string()
                    .map_err(|e| DetectError::MalformedBody(e.to_string()))?;
                (status, text)
            }
            Err(ureq::Error::Status(status, response)) => {
                (status, response.into_string().unwrap_or_default())
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(DetectError::Transport(transport.to_string()));
            }
        };

        tracing::debug!(
            "Detect endpoint answered {} in {} ms",
            status,
            started.elapsed().as_millis()
        );

        parse_detect_response(status, &text)
    }
}

fn new_boundary() -> String {
    format!("----recyclevision{:016x}", rand::random::<u64>())
}

/// Builds a `multipart/form-data` body holding a single file part.
pub fn encode_multipart(boundary: &str, field_name: &str, upload: &ImageUpload) -> Vec<u8> {
    let file_name: String = upload
        .file_name
        .chars()
        .filter(|c| !matches!(c, '"' | '\r' | '\n'))
        .collect();
    let part_header = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
        boundary, field_name, file_name, upload.content_type
    );

    let mut body = part_header.into_bytes();
    body.extend_from_slice(&upload.data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

/// Classifies a detect response. A 2xx body carrying `error` is still a failure.
pub fn parse_detect_response(status: u16, body: &str) -> Result<DetectionReport, DetectError> {
    let value = serde_json::from_str::<serde_json::Value>(body);

    if !(200..300).contains(&status) {
        let message = value
            .ok()
            .as_ref()
            .and_then(error_message)
            .map(str::to_string);
        return Err(DetectError::Status { status, message });
    }

    let value = value.map_err(|e| DetectError::MalformedBody(e.to_string()))?;
    if let Some(message) = error_message(&value) {
        return Err(DetectError::Service(message.to_string()));
    }

    let mut report: DetectionReport =
        serde_json::from_value(value).map_err(|e| DetectError::MalformedBody(e.to_string()))?;
    report.detections = std::mem::take(&mut report.detections)
        .into_iter()
        .filter_map(|detection| match detection.sanitize() {
            Ok(detection) => Some(detection),
            Err(reason) => {
                tracing::warn!("Skipping detection: {}", reason);
                None
            }
        })
        .collect();

    Ok(report)
}

fn error_message(value: &serde_json::Value) -> Option<&str> {
    value.get("error").and_then(|e| e.as_str())
}
