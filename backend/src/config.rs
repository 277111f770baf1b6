use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::inference::preprocess::{Normalization, TensorLayout};
use crate::inference::registry::ModelKind;

const DEFAULT_PORT: u16 = 8081;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_MODEL_CONFIG: &str = "config/models.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("Failed to read model config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse model config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Server settings taken from the process environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub database_url: String,
    pub model_config_path: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests never touch
    /// the real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "MAX_UPLOAD_BYTES",
                value,
            })?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            jwt_secret: lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            model_config_path: lookup("MODEL_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_CONFIG)),
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            max_upload_bytes,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Contents of the model registry file (`config/models.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub version: f32,
    #[serde(default)]
    pub image: ImageConfig,
    pub models: BTreeMap<ModelKind, ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    pub size: [u32; 2],
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self { size: [224, 224] }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub normalization: Option<Normalization>,
    #[serde(default)]
    pub layout: TensorLayout,
    #[serde(default)]
    pub output: OutputActivation,
}

/// What the model's final layer emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputActivation {
    #[default]
    Probabilities,
    Logits,
}

impl ModelsConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> Result<Self, ConfigError> {
        let config: ModelsConfig = serde_yaml::from_str(config_str)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn app_config_applies_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "secret"),
            ("DATABASE_URL", "postgres://localhost/ai_doctor"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8081);
        assert_eq!(config.bind_address(), "0.0.0.0:8081");
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.model_config_path, PathBuf::from("config/models.yaml"));
    }

    #[test]
    fn app_config_requires_jwt_secret() {
        let err = AppConfig::from_lookup(lookup_from(&[(
            "DATABASE_URL",
            "postgres://localhost/ai_doctor",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn app_config_rejects_bad_port() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "secret"),
            ("DATABASE_URL", "postgres://localhost/ai_doctor"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn models_config_parses_registry() {
        let yaml = r#"
version: 1.0
image:
  size: [224, 224]
models:
  ecg:
    path: models/ecg.pt
    normalization: rescale
  xray:
    path: models/xray.pt
    normalization: caffe
    layout: nchw
    output: logits
"#;
        let config = ModelsConfig::parse(yaml).unwrap();
        assert_eq!(config.models.len(), 2);

        let ecg = &config.models[&ModelKind::Ecg];
        assert_eq!(ecg.normalization, Some(Normalization::Rescale));
        assert_eq!(ecg.layout, TensorLayout::Nhwc);
        assert_eq!(ecg.output, OutputActivation::Probabilities);

        let xray = &config.models[&ModelKind::Xray];
        assert_eq!(xray.layout, TensorLayout::Nchw);
        assert_eq!(xray.output, OutputActivation::Logits);
    }

    #[test]
    fn models_config_rejects_unknown_model_kind() {
        let yaml = "version: 1.0\nmodels:\n  retina:\n    path: a.pt\n";
        assert!(matches!(
            ModelsConfig::parse(yaml),
            Err(ConfigError::Parse(_))
        ));
    }
}
