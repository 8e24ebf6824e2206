//! Error Handling Module
//!
//! Errors are split by lifecycle: [`LoadError`] is fatal and only happens at
//! startup, while [`PreprocessError`] and [`InferenceError`] are scoped to a
//! single request and leave the loaded model untouched.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to build the model or bind weights onto it
#[derive(Error, Debug)]
pub enum LoadError {
    /// The weights file does not exist
    #[error("Weights file not found: {0}")]
    NotFound(PathBuf),

    /// The file exists but could not be read or decoded as a record
    #[error("Failed to read weights from '{path}': {message}")]
    Record { path: PathBuf, message: String },

    /// Format could not be inferred from the file name
    #[error("Cannot infer weights format for '{0}' (expected .mpk, .pth or .pt)")]
    UnknownFormat(PathBuf),

    /// Number of parameter tensors differs from the architecture
    #[error("Parameter count mismatch: architecture has {expected}, weights have {found}")]
    ParameterCount { expected: usize, found: usize },

    /// A parameter tensor has the wrong shape
    #[error("Shape mismatch for parameter #{position}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        position: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// The architecture configuration itself is invalid
    #[error("Invalid model configuration: {0}")]
    Config(String),
}

/// Failure to turn an input image into a model tensor
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// Encoded bytes could not be decoded
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Pixel layout cannot be represented as 3-channel colour
    #[error("Unsupported channel layout: {0}")]
    UnsupportedLayout(String),

    /// Image has zero width or height
    #[error("Image is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// Aspect ratio too extreme for the shorter side to be resized
    #[error("Image of {width}x{height} cannot be resized without overflowing")]
    AspectRatio { width: u32, height: u32 },

    /// Raw buffer length does not match the declared dimensions
    #[error("Raw buffer of {actual} bytes does not match {width}x{height}x{channels}")]
    BufferSize {
        width: u32,
        height: u32,
        channels: u8,
        actual: usize,
    },
}

/// Failure during the forward pass or post-processing
#[derive(Error, Debug)]
pub enum InferenceError {
    /// Output contains NaN or infinity
    #[error("Non-finite probability for class {index}: {value}")]
    NonFinite { index: usize, value: f32 },

    /// Output has the wrong number of classes
    #[error("Model produced {found} outputs, expected {expected}")]
    OutputShape { expected: usize, found: usize },

    /// Tensor data could not be read back from the device
    #[error("Failed to read model output: {0}")]
    Readback(String),
}

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum LeafDiseaseError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LeafDiseaseError {
    /// Whether the service may keep serving after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LeafDiseaseError::Preprocess(_) | LeafDiseaseError::Inference(_)
        )
    }
}

/// Convenience Result type
pub type Result<T> = std::result::Result<T, LeafDiseaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoadError::NotFound(PathBuf::from("/models/effnetb2.mpk"));
        assert!(err.to_string().contains("effnetb2.mpk"));

        let err = InferenceError::OutputShape {
            expected: 38,
            found: 10,
        };
        assert_eq!(err.to_string(), "Model produced 10 outputs, expected 38");
    }

    #[test]
    fn test_recoverability() {
        let load: LeafDiseaseError = LoadError::Config("bad".into()).into();
        assert!(!load.is_recoverable());

        let pre: LeafDiseaseError = PreprocessError::EmptyImage {
            width: 0,
            height: 4,
        }
        .into();
        assert!(pre.is_recoverable());

        let inf: LeafDiseaseError = InferenceError::NonFinite {
            index: 3,
            value: f32::NAN,
        }
        .into();
        assert!(inf.is_recoverable());
    }

    #[test]
    fn test_transparent_display() {
        let err: LeafDiseaseError = PreprocessError::Decode("bad header".into()).into();
        assert_eq!(err.to_string(), "Failed to decode image: bad header");
    }
}
