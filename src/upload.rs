use crate::detect_service::{DetectError, DetectionService, ImageUpload};
use crate::detection::DetectionReport;
use crate::notice::NoticeBoard;
use crate::telemetry::Metrics;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No file selected")]
    NoFileSelected,
    #[error("An analysis is already running")]
    AnalysisInProgress,
    #[error("Unsupported file type: {0}")]
    NotAnImage(String),
    #[error("Selected file is empty")]
    EmptyFile,
    #[error(transparent)]
    Detect(#[from] DetectError),
}

/// What the upload page shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadState {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<usize>,
    pub can_analyze: bool,
    pub analyzing: bool,
    pub results: Option<DetectionReport>,
}

#[derive(Default)]
struct UploadForm {
    selected: Option<ImageUpload>,
    selection: u64,
    analyzing: bool,
    results: Option<DetectionReport>,
}

impl UploadForm {
    fn can_analyze(&self) -> bool {
        self.selected.is_some() && !self.analyzing
    }

    fn state(&self) -> UploadState {
        UploadState {
            file_name: self.selected.as_ref().map(|s| s.file_name.clone()),
            content_type: self.selected.as_ref().map(|s| s.content_type.clone()),
            size: self.selected.as_ref().map(|s| s.data.len()),
            can_analyze: self.can_analyze(),
            analyzing: self.analyzing,
            results: self.results.clone(),
        }
    }
}

/// Clears the analyzing flag even if the caller's future is dropped mid-request.
struct AnalyzingGuard<'a> {
    form: &'a Mutex<UploadForm>,
}

impl Drop for AnalyzingGuard<'_> {
    fn drop(&mut self) {
        self.form.lock().analyzing = false;
    }
}

pub struct UploadSession {
    form: Mutex<UploadForm>,
    service: Arc<dyn DetectionService>,
    notices: Arc<NoticeBoard>,
    metrics: Option<Arc<Metrics>>,
}

impl UploadSession {
    pub fn new(service: Arc<dyn DetectionService>, notices: Arc<NoticeBoard>) -> Self {
        Self {
            form: Mutex::new(UploadForm::default()),
            service,
            notices,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> UploadState {
        self.form.lock().state()
    }

    pub fn preview(&self) -> Option<ImageUpload> {
        self.form.lock().selected.clone()
    }

    /// Replaces the selected image and clears earlier results.
    pub fn select(&self, upload: ImageUpload) -> Result<UploadState, UploadError> {
        if !upload.content_type.starts_with("image/") {
            return Err(UploadError::NotAnImage(upload.content_type));
        }
        if upload.data.is_empty() {
            return Err(UploadError::EmptyFile);
        }

        tracing::info!(
            "Selected {} ({} bytes)",
            upload.file_name,
            upload.data.len()
        );
        let mut form = self.form.lock();
        form.selected = Some(upload);
        form.selection += 1;
        form.results = None;
        Ok(form.state())
    }

    /// Sends the selected image for detection. Prior results survive a failure.
    #[instrument(skip(self))]
    pub async fn analyze(&self) -> Result<DetectionReport, UploadError> {
        let (upload, selection) = {
            let mut form = self.form.lock();
            if form.analyzing {
                return Err(UploadError::AnalysisInProgress);
            }
            let upload = form.selected.clone().ok_or(UploadError::NoFileSelected)?;
            form.analyzing = true;
            (upload, form.selection)
        };
        let _guard = AnalyzingGuard { form: &self.form };

        let service = self.service.clone();
        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || service.detect(&upload))
            .await
            .unwrap_or_else(|e| Err(DetectError::Transport(format!("request task failed: {}", e))));
        if let Some(metrics) = &self.metrics {
            metrics.record_detect_duration(started.elapsed().as_millis() as u64, "upload");
        }

        match result {
            Ok(report) => {
                {
                    let mut form = self.form.lock();
                    if form.selection == selection {
                        form.results = Some(report.clone());
                    }
                }
                self.notices
                    .info("Analysis Complete!", "Waste classification successful");
                Ok(report)
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_detect_failure("upload", e.kind());
                }
                self.notices
                    .destructive(e.notice_title(), &e.user_message());
                Err(e.into())
            }
        }
    }
}
