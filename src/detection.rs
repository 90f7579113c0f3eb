use serde::{Deserialize, Serialize};

/// Class labels the remote model was trained on.
pub const KNOWN_CLASSES: [&str; 22] = [
    "battery",
    "can",
    "cardboard_bowl",
    "cardboard_box",
    "chemical_plastic_bottle",
    "chemical_plastic_gallon",
    "chemical_spray_can",
    "light_bulb",
    "paint_bucket",
    "plastic_bag",
    "plastic_bottle",
    "plastic_bottle_cap",
    "plastic_box",
    "plastic_cultery",
    "plastic_cup",
    "plastic_cup_lid",
    "reuseable_paper",
    "scrap_paper",
    "scrap_plastic",
    "snack_bag",
    "stick",
    "straw",
];

pub fn is_known_class(category: &str) -> bool {
    KNOWN_CLASSES.contains(&category)
}

/// One classified object. `bbox` is `[x1, y1, x2, y2]` in pixels of the submitted frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub category: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn is_known(&self) -> bool {
        is_known_class(&self.category)
    }

    pub fn confidence_percent(&self) -> f32 {
        self.confidence * 100.0
    }

    /// Overlay caption, e.g. `plastic_bottle 87.0%`.
    pub fn label(&self) -> String {
        format!("{} {:.1}%", self.category, self.confidence_percent())
    }

    pub fn x1(&self) -> f32 {
        self.bbox[0]
    }

    pub fn y1(&self) -> f32 {
        self.bbox[1]
    }

    pub fn width(&self) -> f32 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> f32 {
        self.bbox[3] - self.bbox[1]
    }

    /// Clamps the confidence into [0, 1]. Fails only for values that cannot be drawn.
    pub(crate) fn sanitize(mut self) -> Result<Self, String> {
        if !self.confidence.is_finite() {
            return Err(format!("confidence of '{}' is not finite", self.category));
        }
        if self.bbox.iter().any(|v| !v.is_finite()) {
            return Err(format!("bbox of '{}' is not finite", self.category));
        }
        self.confidence = self.confidence.clamp(0.0, 1.0);
        Ok(self)
    }
}

/// Success body of the detect endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recyclable: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<String>,
}

impl DetectionReport {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            ..Default::default()
        }
    }

    pub fn has_unknown(&self) -> bool {
        self.detections.iter().any(|d| !d.is_known())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bottle() -> Detection {
        Detection {
            category: "plastic_bottle".to_string(),
            confidence: 0.87,
            bbox: [10.0, 10.0, 50.0, 50.0],
        }
    }

    #[test]
    fn test_label_contains_category_and_percent() {
        let label = bottle().label();

        assert_eq!(label, "plastic_bottle 87.0%");
    }

    #[test]
    fn test_known_classes() {
        assert!(bottle().is_known());
        assert!(!is_known_class("banana_peel"));
        assert_eq!(KNOWN_CLASSES.len(), 22);
    }

    #[test]
    fn test_geometry() {
        let det = bottle();

        assert_eq!(det.x1(), 10.0);
        assert_eq!(det.y1(), 10.0);
        assert_eq!(det.width(), 40.0);
        assert_eq!(det.height(), 40.0);
    }

    #[test]
    fn test_sanitize_clamps_confidence_and_rejects_non_finite() {
        let mut det = bottle();
        det.confidence = 1.02;
        assert_eq!(det.clone().sanitize().unwrap().confidence, 1.0);

        det.confidence = -0.01;
        assert_eq!(det.clone().sanitize().unwrap().confidence, 0.0);

        det.confidence = f32::NAN;
        assert!(det.clone().sanitize().is_err());

        let mut det = bottle();
        det.bbox[2] = f32::INFINITY;
        assert!(det.sanitize().is_err());
    }

    #[test]
    fn test_report_parses_camel_case_summary() {
        let body = r#"{
            "detections": [{"category": "can", "confidence": 0.5, "bbox": [1, 2, 3, 4]}],
            "totalItems": 1,
            "recyclable": 1,
            "processingTime": "12.34 ms"
        }"#;

        let report: DetectionReport = serde_json::from_str(body).unwrap();

        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.total_items, Some(1));
        assert_eq!(report.processing_time.as_deref(), Some("12.34 ms"));
        assert!(!report.has_unknown());
    }
}
