//! EfficientNet Architecture for Plant Disease Classification
//!
//! Mobile inverted bottleneck (MBConv) network with squeeze-and-excitation,
//! SiLU activations and a dropout + linear classifier head. Module fields
//! mirror the torchvision layout closely enough that pretrained state dicts
//! can be remapped onto it (see `loader`).

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig,
        PaddingConfig2d,
    },
    tensor::{
        activation::{sigmoid, silu, softmax},
        backend::Backend,
        Tensor,
    },
};

use super::config::{EfficientNetConfig, StageSpec};

/// Named parameter shape, in module traversal order
pub type ParamShape = (String, Vec<usize>);

/// Convolution followed by BatchNorm and an optional SiLU
#[derive(Module, Debug)]
pub struct ConvNormActivation<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
    activation: bool,
}

impl<B: Backend> ConvNormActivation<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
        activation: bool,
        norm_eps: f64,
        device: &B::Device,
    ) -> Self {
        let padding = (kernel_size - 1) / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_groups(groups)
            .with_bias(false)
            .init(device);

        let norm = BatchNormConfig::new(out_channels)
            .with_epsilon(norm_eps)
            .init(device);

        Self {
            conv,
            norm,
            activation,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);

        if self.activation {
            silu(x)
        } else {
            x
        }
    }

    fn collect_shapes(&self, prefix: &str, out: &mut Vec<ParamShape>) {
        conv_shapes(&format!("{prefix}.conv"), &self.conv, out);
        norm_shapes(&format!("{prefix}.norm"), &self.norm, out);
    }
}

/// Channel attention: global pool, bottleneck, sigmoid gate
#[derive(Module, Debug)]
pub struct SqueezeExcitation<B: Backend> {
    pub pool: AdaptiveAvgPool2d,
    pub reduce: Conv2d<B>,
    pub expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcitation<B> {
    pub fn new(channels: usize, squeeze_channels: usize, device: &B::Device) -> Self {
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([channels, squeeze_channels], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeeze_channels, channels], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let scale = self.pool.forward(x.clone());
        let scale = silu(self.reduce.forward(scale));
        let scale = sigmoid(self.expand.forward(scale));

        x * scale
    }

    fn collect_shapes(&self, prefix: &str, out: &mut Vec<ParamShape>) {
        conv_shapes(&format!("{prefix}.reduce"), &self.reduce, out);
        conv_shapes(&format!("{prefix}.expand"), &self.expand, out);
    }
}

/// Mobile inverted bottleneck block
#[derive(Module, Debug)]
pub struct MBConv<B: Backend> {
    /// 1x1 expansion, absent when the expand ratio is 1
    pub expand: Option<ConvNormActivation<B>>,
    pub depthwise: ConvNormActivation<B>,
    pub se: SqueezeExcitation<B>,
    pub project: ConvNormActivation<B>,
    use_residual: bool,
}

impl<B: Backend> MBConv<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stage: &StageSpec,
        stride: usize,
        norm_eps: f64,
        device: &B::Device,
    ) -> Self {
        let expanded = in_channels * stage.expand_ratio;

        let expand = (expanded != in_channels).then(|| {
            ConvNormActivation::new(in_channels, expanded, 1, 1, 1, true, norm_eps, device)
        });

        let depthwise = ConvNormActivation::new(
            expanded,
            expanded,
            stage.kernel_size,
            stride,
            expanded,
            true,
            norm_eps,
            device,
        );

        // Squeeze width follows the block input, not the expanded width
        let se = SqueezeExcitation::new(expanded, (in_channels / 4).max(1), device);

        let project =
            ConvNormActivation::new(expanded, out_channels, 1, 1, 1, false, norm_eps, device);

        Self {
            expand,
            depthwise,
            se,
            project,
            use_residual: stride == 1 && in_channels == out_channels,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match &self.expand {
            Some(expand) => expand.forward(input.clone()),
            None => input.clone(),
        };
        let x = self.depthwise.forward(x);
        let x = self.se.forward(x);
        let x = self.project.forward(x);

        // Stochastic depth is the identity at inference
        if self.use_residual {
            x + input
        } else {
            x
        }
    }

    fn collect_shapes(&self, prefix: &str, out: &mut Vec<ParamShape>) {
        if let Some(expand) = &self.expand {
            expand.collect_shapes(&format!("{prefix}.expand"), out);
        }
        self.depthwise
            .collect_shapes(&format!("{prefix}.depthwise"), out);
        self.se.collect_shapes(&format!("{prefix}.se"), out);
        self.project.collect_shapes(&format!("{prefix}.project"), out);
    }
}

/// EfficientNet classifier
///
/// Architecture:
/// - 3x3 stride-2 stem
/// - 7 stages of MBConv blocks (scaled by width/depth multipliers)
/// - 1x1 head convolution, global average pooling
/// - Dropout and a linear layer over `num_classes`
#[derive(Module, Debug)]
pub struct EfficientNet<B: Backend> {
    pub stem: ConvNormActivation<B>,
    pub stages: Vec<Vec<MBConv<B>>>,
    pub head: ConvNormActivation<B>,
    pub pool: AdaptiveAvgPool2d,
    pub dropout: Dropout,
    pub classifier: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> EfficientNet<B> {
    /// Create a new EfficientNet from configuration
    pub fn new(config: &EfficientNetConfig, device: &B::Device) -> Self {
        let eps = config.norm_eps;
        let stem_channels = config.stem_channels();

        let stem =
            ConvNormActivation::new(config.in_channels, stem_channels, 3, 2, 1, true, eps, device);

        let stage_specs = config.stages();
        let stages = stage_specs
            .iter()
            .map(|spec| {
                (0..spec.num_layers)
                    .map(|layer| {
                        // Only the first block of a stage changes width or resolution
                        let (in_channels, stride) = if layer == 0 {
                            (spec.in_channels, spec.stride)
                        } else {
                            (spec.out_channels, 1)
                        };
                        MBConv::new(in_channels, spec.out_channels, spec, stride, eps, device)
                    })
                    .collect()
            })
            .collect();

        let last_channels = stage_specs
            .last()
            .map(|s| s.out_channels)
            .unwrap_or(stem_channels);
        let head_channels = config.head_channels();
        let head =
            ConvNormActivation::new(last_channels, head_channels, 1, 1, 1, true, eps, device);

        Self {
            stem,
            stages,
            head,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(config.dropout).init(),
            classifier: LinearConfig::new(head_channels, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(x);

        for stage in &self.stages {
            for block in stage {
                x = block.forward(x);
            }
        }

        let x = self.head.forward(x);
        let x = self.pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.dropout.forward(x);
        self.classifier.forward(x)
    }

    /// Forward pass with softmax over the class dimension
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Every parameter and running statistic with its shape
    pub fn parameter_shapes(&self) -> Vec<ParamShape> {
        let mut out = Vec::new();
        self.stem.collect_shapes("stem", &mut out);

        for (s, stage) in self.stages.iter().enumerate() {
            for (b, block) in stage.iter().enumerate() {
                block.collect_shapes(&format!("stages.{s}.{b}"), &mut out);
            }
        }

        self.head.collect_shapes("head", &mut out);

        out.push((
            "classifier.weight".to_string(),
            self.classifier.weight.dims().to_vec(),
        ));
        if let Some(bias) = &self.classifier.bias {
            out.push(("classifier.bias".to_string(), bias.dims().to_vec()));
        }

        out
    }
}

fn conv_shapes<B: Backend>(prefix: &str, conv: &Conv2d<B>, out: &mut Vec<ParamShape>) {
    out.push((format!("{prefix}.weight"), conv.weight.dims().to_vec()));
    if let Some(bias) = &conv.bias {
        out.push((format!("{prefix}.bias"), bias.dims().to_vec()));
    }
}

fn norm_shapes<B: Backend>(prefix: &str, norm: &BatchNorm<B, 2>, out: &mut Vec<ParamShape>) {
    out.push((format!("{prefix}.gamma"), norm.gamma.dims().to_vec()));
    out.push((format!("{prefix}.beta"), norm.beta.dims().to_vec()));
    out.push((
        format!("{prefix}.running_mean"),
        norm.running_mean.value().dims().to_vec(),
    ));
    out.push((
        format!("{prefix}.running_var"),
        norm.running_var.value().dims().to_vec(),
    ));
}
