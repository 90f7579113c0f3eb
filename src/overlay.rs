use crate::detection::{Detection, DetectionReport};
use serde::Serialize;
use std::fmt;

pub const KNOWN_COLOR: [u8; 3] = [0, 255, 0];
pub const UNKNOWN_COLOR: [u8; 3] = [255, 0, 0];

/// Captions go above the box unless it touches the top edge.
const LABEL_ABOVE_MIN_Y: f32 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub label: String,
    pub label_x: f32,
    pub label_y: f32,
    pub color: [u8; 3],
    pub known: bool,
}

impl OverlayBox {
    pub fn from_detection(detection: &Detection) -> Self {
        let known = detection.is_known();
        let x = detection.x1();
        let y = detection.y1();
        let label_y = if y > LABEL_ABOVE_MIN_Y { y - 5.0 } else { y + 15.0 };

        Self {
            x,
            y,
            width: detection.width(),
            height: detection.height(),
            label: detection.label(),
            label_x: x,
            label_y,
            color: if known { KNOWN_COLOR } else { UNKNOWN_COLOR },
            known,
        }
    }
}

/// Boxes painted over the live frame, in frame pixel coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overlay {
    pub boxes: Vec<OverlayBox>,
}

impl Overlay {
    pub fn from_detections(detections: &[Detection]) -> Self {
        Self {
            boxes: detections.iter().map(OverlayBox::from_detection).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "count", rename_all = "snake_case")]
pub enum ScanStatus {
    #[default]
    Idle,
    Scanning,
    NoObjects,
    Detected(usize),
    UnknownObject,
}

impl ScanStatus {
    pub fn from_report(report: &DetectionReport) -> Self {
        if report.detections.is_empty() {
            ScanStatus::NoObjects
        } else if report.has_unknown() {
            ScanStatus::UnknownObject
        } else {
            ScanStatus::Detected(report.detections.len())
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Idle => write!(f, "Start detection"),
            ScanStatus::Scanning => write!(f, "Scanning..."),
            ScanStatus::NoObjects => write!(f, "No objects found"),
            ScanStatus::Detected(count) => write!(f, "Detected {} items", count),
            ScanStatus::UnknownObject => write!(f, "Unknown object detected"),
        }
    }
}
