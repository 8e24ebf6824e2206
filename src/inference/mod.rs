//! Inference module: from one image to a labelled probability distribution
//!
//! This module provides:
//! - Preprocessing of arbitrary-size colour images
//! - The gradient-free forward pass and softmax
//! - Labelled results with the measured latency
//! - Latency benchmarking over repeated predictions
//!
//! ## Pipeline
//!
//! `Preprocessor → InferenceEngine → ResultFormatter`, timed end to end and
//! driven by [`Predictor`].

pub mod benchmark;
pub mod engine;
pub mod predictor;
pub mod preprocess;
pub mod result;
pub mod timer;

// Re-export main types for convenience
pub use benchmark::{run_benchmark, BenchmarkConfig, BenchmarkResult, LatencyStats};
pub use engine::{InferenceEngine, InferenceScope};
pub use predictor::Predictor;
pub use preprocess::{InputTensor, PreprocessConfig, Preprocessor, IMAGENET_MEAN, IMAGENET_STD};
pub use result::{ClassProbability, PredictionResult, ResultFormatter};
pub use timer::{Timer, LATENCY_DECIMALS};

/// Number of labels a results panel shows by default
pub const DEFAULT_TOP_K: usize = 3;
