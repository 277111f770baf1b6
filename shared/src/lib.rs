use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body returned by the ECG endpoints (`/predict/` and `/predict/ecg`).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EcgPredictionResponse {
    pub predicted_class: usize,
    pub predicted_class_description: String,
    /// Formatted as `NN.NN%`.
    pub confidence: String,
}

/// Body returned by the MRI and X-ray endpoints.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClassificationResponse {
    pub predicted_class: String,
    pub confidence: f64,
    pub class_confidences: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelInfo {
    pub kind: String,
    pub path: String,
    pub normalization: String,
    pub layout: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_response_serializes_confidences_as_object() {
        let mut class_confidences = BTreeMap::new();
        class_confidences.insert("Normal".to_string(), 75.0);
        class_confidences.insert("Pneumonia".to_string(), 25.0);
        let body = ClassificationResponse {
            predicted_class: "Normal".into(),
            confidence: 75.0,
            class_confidences,
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["predicted_class"], "Normal");
        assert_eq!(value["class_confidences"]["Pneumonia"], 25.0);
    }

    #[test]
    fn error_response_has_single_error_field() {
        let value = serde_json::to_value(ErrorResponse::new("No file provided")).unwrap();
        assert_eq!(value, serde_json::json!({"error": "No file provided"}));
    }
}
