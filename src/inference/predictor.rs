//! Inference Predictor Module
//!
//! [`Predictor`] is the entry point a front-end holds on to: it is created
//! once from a [`PredictorConfig`] and then answers `predict` calls. A
//! failed load never produces a predictor, and a failed request leaves it
//! untouched and ready for the next one.

use burn::tensor::backend::Backend;
use image::DynamicImage;
use tracing::{debug, warn};

use super::engine::InferenceEngine;
use super::preprocess::{image_from_raw, InputTensor, PreprocessConfig, Preprocessor};
use super::result::{ClassProbability, PredictionResult, ResultFormatter};
use super::timer::Timer;
use crate::classes::ClassRegistry;
use crate::config::PredictorConfig;
use crate::model::{ModelLoader, ModelState};
use crate::utils::error::{LoadError, Result};

/// Loaded model plus the preprocessing it was trained with
///
/// Cloning shares the weight buffers, so each worker thread can hold its
/// own clone.
#[derive(Debug, Clone)]
pub struct Predictor<B: Backend> {
    engine: InferenceEngine<B>,
    preprocessor: Preprocessor,
    registry: ClassRegistry,
}

impl<B: Backend> Predictor<B> {
    /// Load weights and prepare the pipeline
    pub fn load(config: &PredictorConfig, device: B::Device) -> std::result::Result<Self, LoadError> {
        config
            .validate()
            .map_err(|e| LoadError::Config(e.to_string()))?;

        let state = ModelLoader::<B>::new(config.model.clone(), device)
            .load(&config.weights, config.format)?;

        Ok(Self::new(state, config.preprocess.clone()))
    }

    /// Wrap an already loaded model
    pub fn new(state: ModelState<B>, preprocess: PreprocessConfig) -> Self {
        if preprocess.crop_size as usize != state.config().image_size {
            warn!(
                "Crop size {} differs from model input size {}",
                preprocess.crop_size,
                state.config().image_size
            );
        }

        Self {
            engine: InferenceEngine::new(state),
            preprocessor: Preprocessor::new(preprocess),
            registry: ClassRegistry::plant_village(),
        }
    }

    /// Classify one image
    ///
    /// The reported latency covers preprocessing, the forward pass and
    /// formatting.
    pub fn predict(&self, image: &DynamicImage) -> Result<PredictionResult> {
        let timer = Timer::start();
        let input = self.preprocessor.preprocess(image)?;
        self.finish(timer, &input)
    }

    /// Classify encoded image bytes (PNG, JPEG, ...)
    ///
    /// Decoding counts towards the reported latency.
    pub fn predict_encoded(&self, bytes: &[u8]) -> Result<PredictionResult> {
        let timer = Timer::start();
        let input = self.preprocessor.preprocess_encoded(bytes)?;
        self.finish(timer, &input)
    }

    /// Classify an interleaved 8-bit pixel buffer
    pub fn predict_raw(
        &self,
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<PredictionResult> {
        let image = image_from_raw(width, height, channels, data)?;
        self.predict(&image)
    }

    fn finish(&self, timer: Timer, input: &InputTensor) -> Result<PredictionResult> {
        let labels = self.classify(input)?;

        let latency_secs = timer.elapsed_secs_rounded();
        let result = PredictionResult::new(labels, latency_secs);

        if let Some(best) = result.best() {
            debug!(
                "Predicted {} ({:.4}) in {:.5}s",
                best.label, best.probability, latency_secs
            );
        }

        Ok(result)
    }

    fn classify(&self, input: &InputTensor) -> Result<Vec<ClassProbability>> {
        let probabilities = self.engine.infer(input)?;
        Ok(ResultFormatter::format(&probabilities, &self.registry)?)
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn state(&self) -> &ModelState<B> {
        self.engine.state()
    }

    pub fn preprocess_config(&self) -> &PreprocessConfig {
        self.preprocessor.config()
    }
}
