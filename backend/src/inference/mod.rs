pub mod classifier;
pub mod postprocess;
pub mod preprocess;
pub mod registry;
pub mod upload;

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use postprocess::PredictionResult;
use registry::LoadedModel;
use upload::UploadedImage;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Model error: {0}")]
    Model(String),
    #[error("Model returned {actual} outputs, expected {expected}")]
    OutputShape { expected: usize, actual: usize },
    #[error("Temporary storage error: {0}")]
    Storage(String),
}

impl InferenceError {
    /// Pipeline stage the error escaped from. Load and storage failures
    /// happen outside the per-request pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            InferenceError::Decode(_) => Some(Stage::Preprocessing),
            InferenceError::Model(_) | InferenceError::OutputShape { .. } => {
                Some(Stage::Inferring)
            }
            InferenceError::Load(_) | InferenceError::Storage(_) => None,
        }
    }
}

/// Lifecycle of one prediction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingUpload,
    Validating,
    Preprocessing,
    Inferring,
    ResponsePrepared,
    ErrorReported,
    CleanedUp,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::AwaitingUpload => "awaiting-upload",
            Stage::Validating => "validating",
            Stage::Preprocessing => "preprocessing",
            Stage::Inferring => "inferring",
            Stage::ResponsePrepared => "response-prepared",
            Stage::ErrorReported => "error-reported",
            Stage::CleanedUp => "cleaned-up",
        };
        f.write_str(name)
    }
}

pub(crate) fn trace_stage(request_id: Uuid, stage: Stage) {
    log::debug!("[{}] -> {}", request_id, stage);
}

/// Runs preprocessing and inference on the stored upload, then deletes it.
/// Blocking; call it from the blocking pool.
pub fn classify_upload(
    request_id: Uuid,
    model: Arc<LoadedModel>,
    upload: UploadedImage,
) -> Result<PredictionResult, InferenceError> {
    let outcome = run_model(request_id, &model, &upload);
    match &outcome {
        Ok(result) => {
            trace_stage(request_id, Stage::ResponsePrepared);
            log::info!(
                "[{}] {} prediction: class {} ({:.2}%)",
                request_id,
                model.kind,
                result.class_index,
                result.confidence
            );
        }
        Err(e) => {
            trace_stage(request_id, Stage::ErrorReported);
            match e.stage() {
                Some(stage) => log::error!(
                    "[{}] {} prediction failed during {}: {}",
                    request_id,
                    model.kind,
                    stage,
                    e
                ),
                None => log::error!("[{}] {} prediction failed: {}", request_id, model.kind, e),
            }
        }
    }

    if let Err(e) = upload.discard() {
        // The response is still valid; only the cleanup failed.
        log::error!("[{}] {}", request_id, e);
    }
    trace_stage(request_id, Stage::CleanedUp);
    outcome
}

fn run_model(
    request_id: Uuid,
    model: &LoadedModel,
    upload: &UploadedImage,
) -> Result<PredictionResult, InferenceError> {
    trace_stage(request_id, Stage::Preprocessing);
    let tensor = model.preprocessing.load_tensor(upload.path())?;

    trace_stage(request_id, Stage::Inferring);
    let raw = model.classifier().predict(&tensor)?;
    model.interpret(raw)
}
