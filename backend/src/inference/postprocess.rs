use shared::{ClassificationResponse, EcgPredictionResponse};

use super::InferenceError;
use crate::config::OutputActivation;

/// Labelled outcome of one forward pass. Percentages are in `0..=100`.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub class_index: usize,
    pub label: String,
    pub confidence: f64,
    pub class_confidences: Vec<(String, f64)>,
}

impl PredictionResult {
    pub fn to_ecg_response(&self) -> EcgPredictionResponse {
        EcgPredictionResponse {
            predicted_class: self.class_index,
            predicted_class_description: self.label.clone(),
            confidence: format!("{:.2}%", self.confidence),
        }
    }

    pub fn to_classification_response(&self) -> ClassificationResponse {
        ClassificationResponse {
            predicted_class: self.label.clone(),
            confidence: self.confidence,
            class_confidences: self.class_confidences.iter().cloned().collect(),
        }
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; the first one wins on ties.
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

pub fn interpret(
    raw: Vec<f32>,
    activation: OutputActivation,
    labels: &[&str],
) -> Result<PredictionResult, InferenceError> {
    if raw.len() != labels.len() {
        return Err(InferenceError::OutputShape {
            expected: labels.len(),
            actual: raw.len(),
        });
    }
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(InferenceError::Model("model produced non-finite output".into()));
    }

    let probabilities = match activation {
        OutputActivation::Probabilities => raw,
        OutputActivation::Logits => softmax(&raw),
    };

    let class_index = argmax(&probabilities).ok_or(InferenceError::OutputShape {
        expected: labels.len(),
        actual: 0,
    })?;

    let class_confidences: Vec<(String, f64)> = labels
        .iter()
        .zip(&probabilities)
        .map(|(label, &p)| (label.to_string(), p as f64 * 100.0))
        .collect();

    Ok(PredictionResult {
        class_index,
        label: labels[class_index].to_string(),
        confidence: class_confidences[class_index].1,
        class_confidences,
    })
}
