//! Backbone architectures for feature extraction.
//!
//! Each supported backbone is described by a static capability entry
//! (stage widths and feature dimension) and built from the same stage
//! primitives, so adding an architecture means adding a table row rather
//! than probing anything at runtime.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::error::{Error, Result};

/// Supported backbone architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackboneKind {
    EfficientNetB0,
    ResNet18,
}

impl BackboneKind {
    pub const ALL: &'static [BackboneKind] = &[Self::EfficientNetB0, Self::ResNet18];

    /// Parse a configured backbone name against the allow-list.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "efficientnet_b0" => Ok(Self::EfficientNetB0),
            "resnet18" => Ok(Self::ResNet18),
            other => Err(Error::Config(format!(
                "unsupported backbone '{other}', expected one of: {}",
                Self::ALL
                    .iter()
                    .map(|k| k.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::EfficientNetB0 => "efficientnet_b0",
            Self::ResNet18 => "resnet18",
        }
    }

    /// Output channel width of each convolutional stage.
    fn stage_channels(&self) -> &'static [usize] {
        match self {
            Self::EfficientNetB0 => &[32, 16, 24, 40, 80, 112, 192, 320],
            Self::ResNet18 => &[64, 64, 128, 256, 512],
        }
    }

    /// Width of the flattened feature vector fed to the classifier head.
    pub fn feature_dim(&self) -> usize {
        match self {
            Self::EfficientNetB0 => 1280,
            Self::ResNet18 => 512,
        }
    }

    /// Whether the last stage is projected up to `feature_dim` with a
    /// 1x1 convolution (EfficientNet-style head).
    fn has_projection(&self) -> bool {
        self.feature_dim() != *self.stage_channels().last().unwrap_or(&0)
    }
}

/// One convolutional stage: Conv2d, BatchNorm, ReLU.
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> ConvStage<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(kernel_size / 2, kernel_size / 2))
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv,
            bn,
            relu: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }
}

/// Feature extractor built from a backbone's capability entry.
///
/// Input is [batch, 3, H, W]; output is [batch, feature_dim].
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    stages: Vec<ConvStage<B>>,
    projection: Option<ConvStage<B>>,
    global_pool: AdaptiveAvgPool2d,
    feature_dim: usize,
}

impl<B: Backend> Backbone<B> {
    pub fn new(kind: BackboneKind, device: &B::Device) -> Self {
        let channels = kind.stage_channels();

        let mut stages = Vec::with_capacity(channels.len());
        let mut in_channels = 3;
        for (i, &out_channels) in channels.iter().enumerate() {
            // The stem and the first few stages downsample so the deepest
            // feature map stays small at 224x224 input.
            let stride = if i < 5 { 2 } else { 1 };
            stages.push(ConvStage::new(in_channels, out_channels, 3, stride, device));
            in_channels = out_channels;
        }

        let projection = if kind.has_projection() {
            Some(ConvStage::new(in_channels, kind.feature_dim(), 1, 1, device))
        } else {
            None
        };

        Self {
            stages,
            projection,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            feature_dim: kind.feature_dim(),
        }
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for stage in &self.stages {
            x = stage.forward(x);
        }
        if let Some(projection) = &self.projection {
            x = projection.forward(x);
        }

        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_parse_allow_list() {
        assert_eq!(
            BackboneKind::parse("efficientnet_b0").unwrap(),
            BackboneKind::EfficientNetB0
        );
        assert_eq!(
            BackboneKind::parse("ResNet18").unwrap(),
            BackboneKind::ResNet18
        );

        let err = BackboneKind::parse("vgg16").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("efficientnet_b0"));
        assert!(msg.contains("resnet18"));
    }

    #[test]
    fn test_feature_dims() {
        assert_eq!(BackboneKind::EfficientNetB0.feature_dim(), 1280);
        assert_eq!(BackboneKind::ResNet18.feature_dim(), 512);
    }

    #[test]
    fn test_backbone_output_shape() {
        let device = Default::default();
        for kind in BackboneKind::ALL {
            let backbone = Backbone::<TestBackend>::new(*kind, &device);
            let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
            let features = backbone.forward(input);
            assert_eq!(features.dims(), [2, kind.feature_dim()]);
        }
    }
}
