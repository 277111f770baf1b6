use serde::{Deserialize, Serialize};
use shared::ModelInfo;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::classifier::{Classifier, load_classifier};
use super::postprocess::{PredictionResult, interpret};
use super::preprocess::{Normalization, Preprocessing};
use super::InferenceError;
use crate::config::{ModelsConfig, OutputActivation};

const ECG_LABELS: [&str; 6] = [
    "Слияние стимуляционного и нормального ритма (Fusion of paced and normal beat)",
    "Слияние желудочкового и нормального ритма (Fusion of ventricular and normal beat)",
    "Нормальный ритм (Normal beat)",
    "Неопределенный или неизвестный тип (Unclassified beat)",
    "Наджелудочковая экстрасистола (Supraventricular premature beat)",
    "Преждевременная желудочковая экстрасистола (Ventricular premature contraction)",
];

const MRI_LABELS: [&str; 4] = ["glioma", "meningioma", "pituitary", "no tumor"];

const XRAY_LABELS: [&str; 3] = ["COVID-19", "Normal", "Pneumonia"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Ecg,
    Mri,
    Xray,
}

impl ModelKind {
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            ModelKind::Ecg => &ECG_LABELS,
            ModelKind::Mri => &MRI_LABELS,
            ModelKind::Xray => &XRAY_LABELS,
        }
    }

    pub fn default_normalization(self) -> Normalization {
        match self {
            ModelKind::Ecg => Normalization::Rescale,
            ModelKind::Mri | ModelKind::Xray => Normalization::Caffe,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Ecg => write!(f, "ecg"),
            ModelKind::Mri => write!(f, "mri"),
            ModelKind::Xray => write!(f, "xray"),
        }
    }
}

/// A classifier together with everything needed to feed it and read its output.
pub struct LoadedModel {
    pub kind: ModelKind,
    pub path: PathBuf,
    pub preprocessing: Preprocessing,
    pub output: OutputActivation,
    classifier: Arc<dyn Classifier>,
}

impl LoadedModel {
    pub fn new(
        kind: ModelKind,
        path: PathBuf,
        preprocessing: Preprocessing,
        output: OutputActivation,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            kind,
            path,
            preprocessing,
            output,
            classifier,
        }
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn interpret(&self, raw: Vec<f32>) -> Result<PredictionResult, InferenceError> {
        interpret(raw, self.output, self.kind.labels())
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            kind: self.kind.to_string(),
            path: self.path.display().to_string(),
            normalization: self.preprocessing.normalization.to_string(),
            layout: self.preprocessing.layout.to_string(),
            labels: self.kind.labels().iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Models loaded once at startup and shared read-only across workers.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<ModelKind, Arc<LoadedModel>>,
}

impl ModelRegistry {
    /// Loads every configured model with the runtime loader. Any failure aborts
    /// the whole load.
    pub fn load(config: &ModelsConfig) -> Result<Self, InferenceError> {
        Self::load_with(config, load_classifier)
    }

    pub fn load_with<F>(config: &ModelsConfig, mut loader: F) -> Result<Self, InferenceError>
    where
        F: FnMut(&std::path::Path) -> Result<Arc<dyn Classifier>, InferenceError>,
    {
        let [width, height] = config.image.size;
        let mut registry = Self::default();
        for (&kind, model_config) in &config.models {
            let preprocessing = Preprocessing {
                width,
                height,
                normalization: model_config
                    .normalization
                    .unwrap_or_else(|| kind.default_normalization()),
                layout: model_config.layout,
            };
            let classifier = loader(&model_config.path)?;
            log::info!(
                "Registered {} model from {} ({}, {})",
                kind,
                model_config.path.display(),
                preprocessing.normalization,
                preprocessing.layout
            );
            registry.insert(LoadedModel::new(
                kind,
                model_config.path.clone(),
                preprocessing,
                model_config.output,
                classifier,
            ));
        }
        Ok(registry)
    }

    pub fn insert(&mut self, model: LoadedModel) {
        self.models.insert(model.kind, Arc::new(model));
    }

    pub fn get(&self, kind: ModelKind) -> Option<Arc<LoadedModel>> {
        self.models.get(&kind).cloned()
    }

    pub fn infos(&self) -> Vec<ModelInfo> {
        self.models.values().map(|m| m.info()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::classifier::testing::FixedClassifier;
    use crate::inference::preprocess::TensorLayout;

    const CONFIG: &str = r#"
version: 1.0
models:
  ecg:
    path: models/model_vgg19.pt
  mri:
    path: models/mri.pt
    layout: nchw
"#;

    #[test]
    fn label_tables_have_expected_sizes() {
        assert_eq!(ModelKind::Ecg.labels().len(), 6);
        assert_eq!(ModelKind::Mri.labels().len(), 4);
        assert_eq!(ModelKind::Xray.labels().len(), 3);
    }

    #[test]
    fn load_with_applies_per_model_default_normalization() {
        let config = ModelsConfig::parse(CONFIG).unwrap();
        let registry = ModelRegistry::load_with(&config, |_| {
            Ok(Arc::new(FixedClassifier(vec![1.0])) as Arc<dyn Classifier>)
        })
        .unwrap();

        let ecg = registry.get(ModelKind::Ecg).unwrap();
        assert_eq!(ecg.preprocessing.normalization, Normalization::Rescale);
        assert_eq!(ecg.preprocessing.width, 224);

        let mri = registry.get(ModelKind::Mri).unwrap();
        assert_eq!(mri.preprocessing.normalization, Normalization::Caffe);
        assert_eq!(mri.preprocessing.layout, TensorLayout::Nchw);

        assert!(registry.get(ModelKind::Xray).is_none());
    }

    #[test]
    fn load_with_fails_on_first_loader_error() {
        let config = ModelsConfig::parse(CONFIG).unwrap();
        let result = ModelRegistry::load_with(&config, |path| {
            Err(InferenceError::Load(path.display().to_string()))
        });
        assert!(matches!(result, Err(InferenceError::Load(_))));
    }

    #[test]
    fn infos_describe_loaded_models() {
        let config = ModelsConfig::parse(CONFIG).unwrap();
        let registry = ModelRegistry::load_with(&config, |_| {
            Ok(Arc::new(FixedClassifier(vec![1.0])) as Arc<dyn Classifier>)
        })
        .unwrap();

        let infos = registry.infos();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[1].kind, "mri");
        assert_eq!(infos[1].normalization, "caffe");
        assert_eq!(infos[1].labels.len(), 4);
    }
}
