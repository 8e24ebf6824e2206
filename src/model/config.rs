//! Model Configuration Module
//!
//! EfficientNet compound scaling. Stage layouts are the B0 baseline; width
//! and depth multipliers scale it to the B2 variant the classifier weights
//! were trained with.

use burn::config::Config;

use crate::classes::NUM_CLASSES;

/// Divisor every scaled channel count is rounded to
pub const CHANNEL_DIVISOR: usize = 8;

/// Configuration for the EfficientNet classifier
#[derive(Config, Debug)]
pub struct EfficientNetConfig {
    /// Number of output classes
    #[config(default = "38")]
    pub num_classes: usize,

    /// Channel width multiplier (1.1 for B2)
    #[config(default = "1.1")]
    pub width_mult: f64,

    /// Layer depth multiplier (1.2 for B2)
    #[config(default = "1.2")]
    pub depth_mult: f64,

    /// Dropout before the classifier (inactive at inference)
    #[config(default = "0.3")]
    pub dropout: f64,

    /// BatchNorm epsilon
    #[config(default = "1e-5")]
    pub norm_eps: f64,

    /// Square input resolution the network expects
    #[config(default = "288")]
    pub image_size: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,
}

/// One stage of MBConv blocks before scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub expand_ratio: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub num_layers: usize,
}

impl StageSpec {
    const fn new(
        expand_ratio: usize,
        kernel_size: usize,
        stride: usize,
        in_channels: usize,
        out_channels: usize,
        num_layers: usize,
    ) -> Self {
        Self {
            expand_ratio,
            kernel_size,
            stride,
            in_channels,
            out_channels,
            num_layers,
        }
    }
}

/// B0 baseline stages
pub const BASE_STAGES: [StageSpec; 7] = [
    StageSpec::new(1, 3, 1, 32, 16, 1),
    StageSpec::new(6, 3, 2, 16, 24, 2),
    StageSpec::new(6, 5, 2, 24, 40, 2),
    StageSpec::new(6, 3, 2, 40, 80, 3),
    StageSpec::new(6, 5, 1, 80, 112, 3),
    StageSpec::new(6, 5, 2, 112, 192, 4),
    StageSpec::new(6, 3, 1, 192, 320, 1),
];

/// Stem output channels before scaling
const BASE_STEM_CHANNELS: usize = 32;

/// Round a scaled channel count to the nearest multiple of `divisor`,
/// never dropping more than 10% below the scaled value
pub fn make_divisible(value: f64, divisor: usize) -> usize {
    let d = divisor as f64;
    let rounded = ((value + d / 2.0) as usize / divisor) * divisor;
    let mut new_value = rounded.max(divisor);
    if (new_value as f64) < 0.9 * value {
        new_value += divisor;
    }
    new_value
}

impl EfficientNetConfig {
    /// The B2 variant used for the PlantVillage classifier
    pub fn b2() -> Self {
        Self::new()
    }

    /// Scale a baseline channel count by the width multiplier
    pub fn scale_channels(&self, channels: usize) -> usize {
        make_divisible(channels as f64 * self.width_mult, CHANNEL_DIVISOR)
    }

    /// Scale a baseline layer count by the depth multiplier
    pub fn scale_depth(&self, layers: usize) -> usize {
        ((layers as f64 * self.depth_mult).ceil() as usize).max(1)
    }

    pub fn stem_channels(&self) -> usize {
        self.scale_channels(BASE_STEM_CHANNELS)
    }

    /// Stage layout after compound scaling
    pub fn stages(&self) -> Vec<StageSpec> {
        BASE_STAGES
            .iter()
            .map(|stage| StageSpec {
                in_channels: self.scale_channels(stage.in_channels),
                out_channels: self.scale_channels(stage.out_channels),
                num_layers: self.scale_depth(stage.num_layers),
                ..*stage
            })
            .collect()
    }

    /// Width of the final 1x1 convolution feeding the classifier
    pub fn head_channels(&self) -> usize {
        4 * self.scale_channels(BASE_STAGES[BASE_STAGES.len() - 1].out_channels)
    }

    /// Total number of MBConv blocks
    pub fn num_blocks(&self) -> usize {
        self.stages().iter().map(|s| s.num_layers).sum()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.num_classes == 0 {
            return Err("num_classes must be greater than 0".to_string());
        }

        if self.num_classes != NUM_CLASSES {
            return Err(format!(
                "num_classes must match the class registry ({}), got {}",
                NUM_CLASSES, self.num_classes
            ));
        }

        if !(self.width_mult > 0.0) || !(self.depth_mult > 0.0) {
            return Err("width_mult and depth_mult must be positive".to_string());
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err("dropout must be in range [0.0, 1.0)".to_string());
        }

        if !(self.norm_eps > 0.0) {
            return Err("norm_eps must be positive".to_string());
        }

        if self.image_size == 0 {
            return Err("image_size must be greater than 0".to_string());
        }

        if self.in_channels != 3 {
            return Err("in_channels must be 3 (RGB)".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_divisible() {
        assert_eq!(make_divisible(35.2, 8), 32);
        assert_eq!(make_divisible(44.0, 8), 48);
        assert_eq!(make_divisible(123.2, 8), 120);
        assert_eq!(make_divisible(3.2, 8), 8);
    }

    #[test]
    fn test_b2_layout() {
        let config = EfficientNetConfig::b2();
        assert!(config.validate().is_ok());
        assert_eq!(config.stem_channels(), 32);
        assert_eq!(config.head_channels(), 1408);

        let stages = config.stages();
        let outs: Vec<usize> = stages.iter().map(|s| s.out_channels).collect();
        assert_eq!(outs, vec![16, 24, 48, 88, 120, 208, 352]);

        let depths: Vec<usize> = stages.iter().map(|s| s.num_layers).collect();
        assert_eq!(depths, vec![2, 3, 3, 4, 4, 5, 2]);
        assert_eq!(config.num_blocks(), 23);
    }

    #[test]
    fn test_config_validation() {
        let config = EfficientNetConfig::b2().with_num_classes(10);
        assert!(config.validate().is_err());

        let config = EfficientNetConfig::b2().with_dropout(1.5);
        assert!(config.validate().is_err());

        let config = EfficientNetConfig::b2().with_width_mult(0.0);
        assert!(config.validate().is_err());

        let config = EfficientNetConfig::b2().with_in_channels(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scaled_down_layout() {
        let config = EfficientNetConfig::b2()
            .with_width_mult(0.1)
            .with_depth_mult(0.1);
        assert!(config.stages().iter().all(|s| s.num_layers == 1));
        assert!(config.stages().iter().all(|s| s.out_channels >= 8));
    }
}
