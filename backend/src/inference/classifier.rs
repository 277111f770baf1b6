use ndarray::Array4;
use std::path::Path;

use super::InferenceError;

/// A pre-loaded model's prediction entry point. Implementations are loaded
/// once at startup and only read afterwards.
pub trait Classifier: Send + Sync {
    /// Runs one forward pass and returns the flattened output vector.
    fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;
}

#[cfg(feature = "torch")]
pub use torch::TorchClassifier;

#[cfg(feature = "torch")]
mod torch {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tch::{CModule, Device, Kind, Tensor};

    /// TorchScript module loaded through libtorch.
    #[derive(Clone)]
    pub struct TorchClassifier {
        model: Arc<Mutex<CModule>>,
        device: Device,
    }

    impl TorchClassifier {
        pub fn load(model_path: &Path) -> Result<Self, InferenceError> {
            let device = Device::cuda_if_available();
            let model = CModule::load_on_device(model_path, device)
                .map_err(|e| InferenceError::Load(format!("{}: {}", model_path.display(), e)))?;
            log::info!("Loaded {} on {:?}", model_path.display(), device);
            Ok(Self {
                model: Arc::new(Mutex::new(model)),
                device,
            })
        }
    }

    impl Classifier for TorchClassifier {
        fn predict(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
            let contiguous = input.as_standard_layout();
            let data = contiguous
                .as_slice()
                .ok_or_else(|| InferenceError::Model("input tensor is not contiguous".into()))?;
            let tensor = Tensor::from_slice(data).view(shape.as_slice()).to_device(self.device);

            let model = self
                .model
                .lock()
                .map_err(|_| InferenceError::Model("model lock poisoned".into()))?;
            let output = tch::no_grad(|| model.forward_ts(&[tensor]))
                .map_err(|e| InferenceError::Model(e.to_string()))?;

            let output_flat = output.to_kind(Kind::Float).view([-1]);
            let num_elements = output_flat.size()[0] as usize;
            let mut output_vec = vec![0.0f32; num_elements];
            output_flat.copy_data(&mut output_vec, num_elements);
            Ok(output_vec)
        }
    }
}

/// Loads the runtime model stored at `path`.
#[cfg(feature = "torch")]
pub fn load_classifier(path: &Path) -> Result<std::sync::Arc<dyn Classifier>, InferenceError> {
    Ok(std::sync::Arc::new(TorchClassifier::load(path)?))
}

#[cfg(not(feature = "torch"))]
pub fn load_classifier(path: &Path) -> Result<std::sync::Arc<dyn Classifier>, InferenceError> {
    Err(InferenceError::Load(format!(
        "{}: built without the `torch` feature, no model runtime available",
        path.display()
    )))
}
