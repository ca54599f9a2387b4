// ============================================================
// Layer 5 — EfficientNet Architecture
// ============================================================
// EfficientNet-B0 topology (Tan & Le, 2019) built from Burn's
// nn building blocks, scaled by width and depth coefficients.
//
//   stem      3x3 conv, stride 2, 32 filters, BN, swish
//   stage 1   MBConv1 k3  x1  → 16
//   stage 2   MBConv6 k3  x2  → 24   stride 2
//   stage 3   MBConv6 k5  x2  → 40   stride 2
//   stage 4   MBConv6 k3  x3  → 80   stride 2
//   stage 5   MBConv6 k5  x3  → 112
//   stage 6   MBConv6 k5  x4  → 192  stride 2
//   stage 7   MBConv6 k3  x1  → 320
//   head      1x1 conv → 1280, BN, swish, global avg pool
//   top       dropout, linear → num_classes
//
// MBConv block:
//   expand 1x1 (ratio > 1) → depthwise kxk → squeeze-excite
//   → project 1x1 → (+ residual when stride 1 and in == out)
//
// Train vs inference behaviour (dropout, batch-norm statistics)
// is selected by the backend: an Autodiff backend trains,
// `model.valid()` gives the inference model.
//
// Input layout is NHWC, matching the data pipeline; it is
// permuted to NCHW for Burn's convolutions.
//
// Reference: Burn Book §3 (Building Blocks)
//            Tan & Le (2019) EfficientNet
//            Hu et al. (2018) Squeeze-and-Excitation Networks

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig,
        Dropout, DropoutConfig,
        Linear, LinearConfig,
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::sigmoid,
};

use crate::ml::classifier::ImageClassifier;

const STEM_FILTERS: usize = 32;
const HEAD_FILTERS: usize = 1280;
const SE_RATIO:     f64   = 0.25;
const DIVISOR:      usize = 8;

/// One row of the B0 stage table.
struct Stage {
    repeats: usize,
    kernel:  usize,
    stride:  usize,
    expand:  usize,
    filters_in:  usize,
    filters_out: usize,
}

const B0_STAGES: [Stage; 7] = [
    Stage { repeats: 1, kernel: 3, stride: 1, expand: 1, filters_in: 32,  filters_out: 16  },
    Stage { repeats: 2, kernel: 3, stride: 2, expand: 6, filters_in: 16,  filters_out: 24  },
    Stage { repeats: 2, kernel: 5, stride: 2, expand: 6, filters_in: 24,  filters_out: 40  },
    Stage { repeats: 3, kernel: 3, stride: 2, expand: 6, filters_in: 40,  filters_out: 80  },
    Stage { repeats: 3, kernel: 5, stride: 1, expand: 6, filters_in: 80,  filters_out: 112 },
    Stage { repeats: 4, kernel: 5, stride: 2, expand: 6, filters_in: 112, filters_out: 192 },
    Stage { repeats: 1, kernel: 3, stride: 1, expand: 6, filters_in: 192, filters_out: 320 },
];

/// Scale a filter count by the width coefficient, rounding to a
/// multiple of 8 without dropping more than 10%.
pub fn round_filters(filters: usize, width: f64) -> usize {
    let scaled  = filters as f64 * width;
    let mut out = ((scaled + DIVISOR as f64 / 2.0) as usize / DIVISOR * DIVISOR).max(DIVISOR);
    if (out as f64) < 0.9 * scaled {
        out += DIVISOR;
    }
    out
}

/// Scale a stage's repeat count by the depth coefficient (rounded up).
pub fn round_repeats(repeats: usize, depth: f64) -> usize {
    ((repeats as f64 * depth).ceil() as usize).max(1)
}

fn swish<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone() * sigmoid(x)
}

#[derive(Config, Debug)]
pub struct EfficientNetConfig {
    pub num_classes: usize,
    /// Input channels (1 for grayscale)
    pub channels: usize,
    #[config(default = 1.0)]
    pub width_coefficient: f64,
    #[config(default = 1.0)]
    pub depth_coefficient: f64,
    /// Dropout before the classifier
    #[config(default = 0.2)]
    pub dropout: f64,
    /// Residual-branch dropout, scaled linearly with block depth
    #[config(default = 0.2)]
    pub drop_connect: f64,
}

impl EfficientNetConfig {
    /// Identifies every shape-determining hyper-parameter; stored in
    /// checkpoint manifests. Dropout rates do not change shapes.
    pub fn fingerprint(&self) -> String {
        format!(
            "efficientnet(width={}, depth={}, channels={}, classes={})",
            self.width_coefficient, self.depth_coefficient, self.channels, self.num_classes,
        )
    }

    /// Width of the pooled feature vector fed to the classifier
    pub fn feature_dim(&self) -> usize {
        round_filters(HEAD_FILTERS, self.width_coefficient)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> EfficientNet<B> {
        let features   = self.init_features(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        let classifier = LinearConfig::new(self.feature_dim(), self.num_classes).init(device);
        EfficientNet { features, dropout, classifier }
    }

    pub fn init_features<B: Backend>(&self, device: &B::Device) -> EfficientNetFeatures<B> {
        let w = self.width_coefficient;
        let stem_out = round_filters(STEM_FILTERS, w);
        let stem = conv_bn(self.channels, stem_out, 3, 1, 2, device);

        let total_blocks: usize = B0_STAGES
            .iter()
            .map(|s| round_repeats(s.repeats, self.depth_coefficient))
            .sum();

        let mut blocks = Vec::with_capacity(total_blocks);
        for stage in &B0_STAGES {
            let filters_in  = round_filters(stage.filters_in, w);
            let filters_out = round_filters(stage.filters_out, w);
            for i in 0..round_repeats(stage.repeats, self.depth_coefficient) {
                // Only the first block of a stage changes resolution / width
                let (c_in, stride) = if i == 0 {
                    (filters_in, stage.stride)
                } else {
                    (filters_out, 1)
                };
                let drop = self.drop_connect * blocks.len() as f64 / total_blocks as f64;
                blocks.push(MbConvSpec {
                    c_in,
                    c_out: filters_out,
                    kernel: stage.kernel,
                    stride,
                    expand: stage.expand,
                    drop,
                }.init(device));
            }
        }

        let last = round_filters(B0_STAGES[B0_STAGES.len() - 1].filters_out, w);
        let head = conv_bn(last, self.feature_dim(), 1, 1, 1, device);
        let pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        EfficientNetFeatures { stem, blocks, head, pool }
    }
}

// ─── Conv + BatchNorm ─────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBn<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.norm.forward(self.conv.forward(x))
    }
}

fn conv_bn<B: Backend>(
    c_in:   usize,
    c_out:  usize,
    kernel: usize,
    groups: usize,
    stride: usize,
    device: &B::Device,
) -> ConvBn<B> {
    let conv = Conv2dConfig::new([c_in, c_out], [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(kernel / 2, kernel / 2))
        .with_groups(groups)
        .with_bias(false)
        .init(device);
    let norm = BatchNormConfig::new(c_out).init(device);
    ConvBn { conv, norm }
}

// ─── Squeeze-and-Excitation ───────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    pub pool:   AdaptiveAvgPool2d,
    pub reduce: Conv2d<B>,
    pub expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcite<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let dims  = x.dims();
        let scale = self.pool.forward(x.clone());
        let scale = swish(self.reduce.forward(scale));
        let scale = sigmoid(self.expand.forward(scale));
        x * scale.expand(dims)
    }
}

// ─── MBConv ───────────────────────────────────────────────────────────────────
struct MbConvSpec {
    c_in:   usize,
    c_out:  usize,
    kernel: usize,
    stride: usize,
    expand: usize,
    drop:   f64,
}

impl MbConvSpec {
    fn init<B: Backend>(&self, device: &B::Device) -> MbConv<B> {
        let hidden = self.c_in * self.expand;
        let expand = (self.expand != 1).then(|| conv_bn(self.c_in, hidden, 1, 1, 1, device));
        let depthwise = conv_bn(hidden, hidden, self.kernel, hidden, self.stride, device);

        // Squeeze width is relative to the block input, not the expanded width
        let squeezed = ((self.c_in as f64 * SE_RATIO) as usize).max(1);
        let se = SqueezeExcite {
            pool:   AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([hidden, squeezed], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeezed, hidden], [1, 1]).init(device),
        };
        let project = conv_bn(hidden, self.c_out, 1, 1, 1, device);

        MbConv {
            expand,
            depthwise,
            se,
            project,
            dropout:  DropoutConfig::new(self.drop).init(),
            residual: self.stride == 1 && self.c_in == self.c_out,
        }
    }
}

#[derive(Module, Debug)]
pub struct MbConv<B: Backend> {
    pub expand:    Option<ConvBn<B>>,
    pub depthwise: ConvBn<B>,
    pub se:        SqueezeExcite<B>,
    pub project:   ConvBn<B>,
    pub dropout:   Dropout,
    pub residual:  bool,
}

impl<B: Backend> MbConv<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input.clone();
        if let Some(expand) = &self.expand {
            x = swish(expand.forward(x));
        }
        let x = swish(self.depthwise.forward(x));
        let x = self.se.forward(x);
        let x = self.project.forward(x);

        if self.residual {
            input + self.dropout.forward(x)
        } else {
            x
        }
    }
}

// ─── Feature extractor ────────────────────────────────────────────────────────
/// Everything up to (and including) global pooling. Shared by the
/// from-scratch classifier and the transfer-learning classifier.
#[derive(Module, Debug)]
pub struct EfficientNetFeatures<B: Backend> {
    pub stem:   ConvBn<B>,
    pub blocks: Vec<MbConv<B>>,
    pub head:   ConvBn<B>,
    pub pool:   AdaptiveAvgPool2d,
}

impl<B: Backend> EfficientNetFeatures<B> {
    /// images: [batch, H, W, C] → features: [batch, feature_dim]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = images.permute([0, 3, 1, 2]);
        let mut x = swish(self.stem.forward(x));
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = swish(self.head.forward(x));
        self.pool.forward(x).flatten::<2>(1, 3)
    }
}

// ─── Full classifier ──────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct EfficientNet<B: Backend> {
    pub features:   EfficientNetFeatures<B>,
    pub dropout:    Dropout,
    pub classifier: Linear<B>,
}

impl<B: Backend> ImageClassifier<B> for EfficientNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.features.forward(images);
        self.classifier.forward(self.dropout.forward(features))
    }
}

/// Smallest useful network: every stage collapsed to one block.
#[cfg(test)]
pub(crate) fn tiny_config_for(num_classes: usize) -> EfficientNetConfig {
    EfficientNetConfig::new(num_classes, 1)
        .with_width_coefficient(0.25)
        .with_depth_coefficient(0.25)
}

#[cfg(test)]
pub(crate) fn tiny_config() -> EfficientNetConfig {
    tiny_config_for(10)
}
