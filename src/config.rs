//! Predictor configuration
//!
//! Everything needed to bring a [`Predictor`](crate::Predictor) up: where
//! the weights live, how to read them, the architecture, and the
//! preprocessing constants. Stored as TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classes::NUM_CLASSES;
use crate::inference::PreprocessConfig;
use crate::model::{EfficientNetConfig, WeightsFormat};
use crate::utils::error::ConfigError;

/// Default weights file, relative to the working directory
pub const DEFAULT_WEIGHTS: &str = "effnetb2_feature_extractor.pth";

/// Configuration for loading and running the classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Path to the weights file
    #[serde(default = "default_weights")]
    pub weights: PathBuf,

    /// Weights format; `auto` decides from the file extension
    #[serde(default)]
    pub format: WeightsFormat,

    /// Network architecture
    #[serde(default = "EfficientNetConfig::b2")]
    pub model: EfficientNetConfig,

    /// Image preprocessing
    #[serde(default)]
    pub preprocess: PreprocessConfig,
}

fn default_weights() -> PathBuf {
    PathBuf::from(DEFAULT_WEIGHTS)
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            format: WeightsFormat::Auto,
            model: EfficientNetConfig::b2(),
            preprocess: PreprocessConfig::default(),
        }
    }
}

impl PredictorConfig {
    /// Default configuration pointing at `weights`
    pub fn with_weights(weights: impl Into<PathBuf>) -> Self {
        Self {
            weights: weights.into(),
            ..Default::default()
        }
    }

    /// Use `model` and derive matching preprocessing sizes from it
    pub fn with_model(mut self, model: EfficientNetConfig) -> Self {
        self.preprocess = PreprocessConfig {
            resize_size: model.image_size as u32,
            crop_size: model.image_size as u32,
            ..self.preprocess
        };
        self.model = model;
        self
    }

    pub fn load_toml(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn save_toml(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate().map_err(ConfigError::Invalid)?;
        self.preprocess.validate().map_err(ConfigError::Invalid)?;

        if self.model.num_classes != NUM_CLASSES {
            return Err(ConfigError::Invalid(format!(
                "model has {} classes but the registry has {}",
                self.model.num_classes, NUM_CLASSES
            )));
        }

        if self.weights.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("weights path is empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PredictorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.weights, PathBuf::from(DEFAULT_WEIGHTS));
        assert_eq!(config.format, WeightsFormat::Auto);
        assert_eq!(config.preprocess.crop_size, 288);
    }

    #[test]
    fn test_toml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("predictor.toml");

        let config = PredictorConfig::with_weights("models/effnetb2.pth").with_model(
            EfficientNetConfig::b2().with_image_size(260),
        );
        config.save_toml(&path).unwrap();

        let loaded = PredictorConfig::load_toml(&path).unwrap();
        assert_eq!(loaded.weights, PathBuf::from("models/effnetb2.pth"));
        assert_eq!(loaded.model.image_size, 260);
        assert_eq!(loaded.preprocess.resize_size, 260);
        assert_eq!(loaded.preprocess.mean, config.preprocess.mean);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("predictor.toml");
        fs::write(&path, "weights = \"w.pth\"\nformat = \"pytorch\"\n").unwrap();

        let loaded = PredictorConfig::load_toml(&path).unwrap();
        assert_eq!(loaded.format, WeightsFormat::PyTorch);
        assert_eq!(loaded.model.num_classes, NUM_CLASSES);
        assert_eq!(loaded.preprocess, PreprocessConfig::default());
    }

    #[test]
    fn test_load_errors() {
        let missing = PredictorConfig::load_toml(Path::new("/nonexistent/predictor.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "weights = [").unwrap();
        assert!(matches!(
            PredictorConfig::load_toml(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validation() {
        let mut config = PredictorConfig::default();
        config.preprocess.crop_size = 512;
        assert!(config.validate().is_err());

        let config = PredictorConfig::default().with_model(EfficientNetConfig::b2().with_num_classes(39));
        assert!(config.validate().is_err());

        let config = PredictorConfig::with_weights("");
        assert!(config.validate().is_err());
    }
}
