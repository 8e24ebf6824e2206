//! Model loading
//!
//! Builds the EfficientNet architecture and binds frozen weights from disk.
//! Two artifact formats are understood: Burn's compact MessagePack records
//! and PyTorch state dicts saved from a torchvision EfficientNet. Every
//! parameter shape is checked against a freshly built template before the
//! model is handed out, so a mismatched file never yields a usable state.

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{CompactRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::config::EfficientNetConfig;
use super::efficientnet::{EfficientNet, EfficientNetRecord, ParamShape};
use crate::utils::error::LoadError;

/// On-disk weights format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightsFormat {
    /// Decide from the file extension
    #[default]
    Auto,
    /// Burn `CompactRecorder` record (`.mpk`)
    Burn,
    /// PyTorch state dict (`.pth` / `.pt`)
    #[serde(rename = "pytorch")]
    PyTorch,
}

impl WeightsFormat {
    /// Resolve `Auto` against a concrete path
    pub fn resolve(self, path: &Path) -> Result<Self, LoadError> {
        match self {
            WeightsFormat::Auto => {
                let extension = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_lowercase());

                match extension.as_deref() {
                    Some("mpk") => Ok(WeightsFormat::Burn),
                    Some("pth") | Some("pt") => Ok(WeightsFormat::PyTorch),
                    _ => Err(LoadError::UnknownFormat(path.to_path_buf())),
                }
            }
            other => Ok(other),
        }
    }
}

impl std::fmt::Display for WeightsFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WeightsFormat::Auto => write!(f, "auto"),
            WeightsFormat::Burn => write!(f, "burn"),
            WeightsFormat::PyTorch => write!(f, "pytorch"),
        }
    }
}

/// Architecture plus frozen weights, placed on a device
///
/// Only [`ModelLoader`] can create one, and nothing mutates it afterwards.
/// Cloning is cheap: parameter buffers are reference counted by the backend.
#[derive(Debug, Clone)]
pub struct ModelState<B: Backend> {
    model: EfficientNet<B>,
    config: EfficientNetConfig,
    device: B::Device,
    source: PathBuf,
    num_params: usize,
}

impl<B: Backend> ModelState<B> {
    pub(crate) fn from_parts(
        model: EfficientNet<B>,
        config: EfficientNetConfig,
        device: B::Device,
        source: PathBuf,
    ) -> Self {
        let num_params = model.num_params();
        Self {
            model,
            config,
            device,
            source,
            num_params,
        }
    }

    pub fn model(&self) -> &EfficientNet<B> {
        &self.model
    }

    pub fn config(&self) -> &EfficientNetConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Path the weights were read from
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn num_params(&self) -> usize {
        self.num_params
    }

    pub fn num_classes(&self) -> usize {
        self.model.num_classes()
    }
}

/// Constructs the architecture and loads weights onto a device
#[derive(Debug, Clone)]
pub struct ModelLoader<B: Backend> {
    config: EfficientNetConfig,
    device: B::Device,
}

impl<B: Backend> ModelLoader<B> {
    pub fn new(config: EfficientNetConfig, device: B::Device) -> Self {
        Self { config, device }
    }

    /// Load weights from `path` in the given format
    pub fn load(&self, path: &Path, format: WeightsFormat) -> Result<ModelState<B>, LoadError> {
        self.config.validate().map_err(LoadError::Config)?;

        if B::ad_enabled() {
            return Err(LoadError::Config(
                "inference requires a backend without autodiff".to_string(),
            ));
        }

        if !path.is_file() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }

        let format = format.resolve(path)?;
        info!("Loading {} weights from {:?}", format, path);

        let template = EfficientNet::<B>::new(&self.config, &self.device);
        let expected = template.parameter_shapes();

        let model = match format {
            WeightsFormat::PyTorch => {
                let record = load_pytorch_record::<B>(path, &self.config, &self.device)?;
                template.load_record(record)
            }
            WeightsFormat::Burn | WeightsFormat::Auto => {
                load_burn_record(template, path, &self.device)?
            }
        };

        verify_shapes(&expected, &model.parameter_shapes())?;

        let state = ModelState::from_parts(
            model,
            self.config.clone(),
            self.device.clone(),
            path.to_path_buf(),
        );

        info!(
            "Model ready: {} parameters, {} classes",
            state.num_params(),
            state.num_classes()
        );

        Ok(state)
    }
}

/// Build the architecture described by `config` and load weights from
/// `weights_path`, inferring the format from its extension
pub fn load<B: Backend>(
    config: &EfficientNetConfig,
    weights_path: &Path,
    device: &B::Device,
) -> Result<ModelState<B>, LoadError> {
    ModelLoader::<B>::new(config.clone(), device.clone()).load(weights_path, WeightsFormat::Auto)
}

fn load_burn_record<B: Backend>(
    template: EfficientNet<B>,
    path: &Path,
    device: &B::Device,
) -> Result<EfficientNet<B>, LoadError> {
    template
        .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
        .map_err(|e| LoadError::Record {
            path: path.to_path_buf(),
            message: format!("{:?}", e),
        })
}

fn load_pytorch_record<B: Backend>(
    path: &Path,
    config: &EfficientNetConfig,
    device: &B::Device,
) -> Result<EfficientNetRecord<B>, LoadError> {
    let args = torchvision_key_remap(config)
        .into_iter()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (pattern, replacement)| {
            args.with_key_remap(&pattern, &replacement)
        });

    PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(args, device)
        .map_err(|e| LoadError::Record {
            path: path.to_path_buf(),
            message: format!("{:?}", e),
        })
}

/// Regex remaps from torchvision EfficientNet keys to this module tree
///
/// torchvision nests everything under `features.N`: index 0 is the stem,
/// 1..=7 are the MBConv stages and 8 is the head conv. Inside a block the
/// sub-layers are numbered, and the numbering shifts by one when the block
/// has no expansion conv.
pub fn torchvision_key_remap(config: &EfficientNetConfig) -> Vec<(String, String)> {
    let stages = config.stages();
    let head_index = stages.len() + 1;

    let mut remaps = vec![
        (r"^features\.0\.0\.".to_string(), "stem.conv.".to_string()),
        (r"^features\.0\.1\.".to_string(), "stem.norm.".to_string()),
        (
            format!(r"^features\.{head_index}\.0\."),
            "head.conv.".to_string(),
        ),
        (
            format!(r"^features\.{head_index}\.1\."),
            "head.norm.".to_string(),
        ),
        (r"^classifier\.1\.".to_string(), "classifier.".to_string()),
    ];

    for (s, spec) in stages.iter().enumerate() {
        let feature = s + 1;
        let target = format!("stages.{s}.${{1}}");
        let layers: &[&str] = if spec.expand_ratio == 1 {
            &["depthwise", "se", "project"]
        } else {
            &["expand", "depthwise", "se", "project"]
        };

        for (position, layer) in layers.iter().enumerate() {
            let source = format!(r"^features\.{feature}\.(\d+)\.block\.{position}\.");
            if *layer == "se" {
                remaps.push((
                    format!("{source}fc1\\."),
                    format!("{target}.se.reduce."),
                ));
                remaps.push((
                    format!("{source}fc2\\."),
                    format!("{target}.se.expand."),
                ));
            } else {
                remaps.push((format!("{source}0\\."), format!("{target}.{layer}.conv.")));
                remaps.push((format!("{source}1\\."), format!("{target}.{layer}.norm.")));
            }
        }
    }

    remaps
}

fn verify_shapes(expected: &[ParamShape], found: &[ParamShape]) -> Result<(), LoadError> {
    if expected.len() != found.len() {
        return Err(LoadError::ParameterCount {
            expected: expected.len(),
            found: found.len(),
        });
    }

    for (position, ((name, want), (_, got))) in expected.iter().zip(found).enumerate() {
        if want != got {
            debug!("Shape mismatch at {}: {:?} vs {:?}", name, want, got);
            return Err(LoadError::ShapeMismatch {
                position,
                expected: want.clone(),
                found: got.clone(),
            });
        }
    }

    Ok(())
}
