//! Forward pass and softmax
//!
//! The model always lives on a backend without autodiff, so no gradient
//! graph is ever recorded. Each pass additionally runs inside an
//! [`InferenceScope`], which marks the inference-only region in the trace
//! and is released on every exit path.

use burn::tensor::backend::Backend;
use tracing::{error, span::EnteredSpan, trace, Level};

use super::preprocess::InputTensor;
use crate::model::ModelState;
use crate::utils::error::InferenceError;

/// Guard held for the duration of one gradient-free forward pass
pub struct InferenceScope {
    _span: EnteredSpan,
}

impl InferenceScope {
    pub fn enter(num_classes: usize) -> Self {
        let span = tracing::span!(Level::TRACE, "inference", num_classes).entered();
        trace!("entering inference scope");
        Self { _span: span }
    }
}

impl Drop for InferenceScope {
    fn drop(&mut self) {
        trace!("leaving inference scope");
    }
}

/// Runs a loaded model on preprocessed input
#[derive(Debug, Clone)]
pub struct InferenceEngine<B: Backend> {
    state: ModelState<B>,
}

impl<B: Backend> InferenceEngine<B> {
    pub fn new(state: ModelState<B>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ModelState<B> {
        &self.state
    }

    /// Class probabilities for one input, in registry order
    pub fn infer(&self, input: &InputTensor) -> Result<Vec<f64>, InferenceError> {
        let _scope = InferenceScope::enter(self.state.num_classes());

        let tensor = input.to_tensor::<B>(self.state.device());
        let probabilities = self.state.model().forward_softmax(tensor);

        let values = probabilities
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| InferenceError::Readback(format!("{:?}", e)))?;

        let expected = self.state.num_classes();
        if values.len() != expected {
            error!("Model produced {} outputs, expected {}", values.len(), expected);
            return Err(InferenceError::OutputShape {
                expected,
                found: values.len(),
            });
        }

        if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            error!(
                "Non-finite probability {} for class {} (weights from {:?})",
                value,
                index,
                self.state.source()
            );
            return Err(InferenceError::NonFinite { index, value });
        }

        Ok(values.into_iter().map(f64::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::preprocess::{PreprocessConfig, Preprocessor};
    use crate::model::{EfficientNet, EfficientNetConfig};
    use burn::module::Param;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::path::PathBuf;

    type TestBackend = NdArray;

    fn tiny_config() -> EfficientNetConfig {
        EfficientNetConfig::b2()
            .with_width_mult(0.1)
            .with_depth_mult(0.1)
            .with_image_size(32)
    }

    fn input() -> InputTensor {
        let image = RgbImage::from_fn(48, 40, |x, y| Rgb([(x * 5) as u8, (y * 6) as u8, 90]));
        Preprocessor::new(PreprocessConfig {
            resize_size: 40,
            crop_size: 32,
            ..Default::default()
        })
        .preprocess(&DynamicImage::ImageRgb8(image))
        .unwrap()
    }

    fn engine(model: EfficientNet<TestBackend>) -> InferenceEngine<TestBackend> {
        let state = ModelState::from_parts(
            model,
            tiny_config(),
            Default::default(),
            PathBuf::from("memory"),
        );
        InferenceEngine::new(state)
    }

    #[test]
    fn test_probabilities_form_distribution() {
        let device = Default::default();
        let engine = engine(EfficientNet::new(&tiny_config(), &device));

        let probs = engine.infer(&input()).unwrap();
        assert_eq!(probs.len(), 38);
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_repeated_inference_is_identical() {
        let device = Default::default();
        let engine = engine(EfficientNet::new(&tiny_config(), &device));
        let input = input();

        let a = engine.infer(&input).unwrap();
        let b = engine.infer(&input).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_nan_weights_are_reported() {
        let device = Default::default();
        let mut model = EfficientNet::<TestBackend>::new(&tiny_config(), &device);
        let dims = model.classifier.weight.dims();
        model.classifier.weight = Param::from_tensor(Tensor::full(dims, f32::NAN, &device));

        let engine = engine(model);
        let result = engine.infer(&input());
        assert!(matches!(result, Err(InferenceError::NonFinite { .. })));

        // The engine is still usable for the next request
        assert!(matches!(
            engine.infer(&input()),
            Err(InferenceError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_scope_drops_cleanly() {
        let scope = InferenceScope::enter(38);
        drop(scope);
        let _again = InferenceScope::enter(38);
    }
}
