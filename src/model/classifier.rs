//! Lesion classifier: backbone feature extractor plus a two-layer head.

use burn::{
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu},
    tensor::{backend::Backend, Tensor},
};

use super::backbone::{Backbone, BackboneKind};

const HEAD_HIDDEN: usize = 512;

/// Two-layer classification head: Dropout, Linear, ReLU, Dropout, Linear.
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    dropout1: Dropout,
    fc1: Linear<B>,
    relu: Relu,
    dropout2: Dropout,
    fc2: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn new(feature_dim: usize, num_classes: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            dropout1: DropoutConfig::new(dropout).init(),
            fc1: LinearConfig::new(feature_dim, HEAD_HIDDEN).init(device),
            relu: Relu::new(),
            dropout2: DropoutConfig::new(dropout).init(),
            fc2: LinearConfig::new(HEAD_HIDDEN, num_classes).init(device),
        }
    }

    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.dropout1.forward(features);
        let x = self.fc1.forward(x);
        let x = self.relu.forward(x);
        let x = self.dropout2.forward(x);
        self.fc2.forward(x)
    }
}

/// Skin lesion classifier.
///
/// When `frozen` is set, backbone features are detached during the
/// forward pass so gradients stop at the head, giving the usual
/// fine-tune-the-head-first transfer learning schedule.
#[derive(Module, Debug)]
pub struct LesionClassifier<B: Backend> {
    backbone: Backbone<B>,
    head: ClassifierHead<B>,
    frozen: bool,
    num_classes: usize,
}

impl<B: Backend> LesionClassifier<B> {
    pub fn new(
        kind: BackboneKind,
        num_classes: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        let backbone = Backbone::new(kind, device);
        let head = ClassifierHead::new(kind.feature_dim(), num_classes, dropout, device);

        Self {
            backbone,
            head,
            frozen: false,
            num_classes,
        }
    }

    /// Logits of shape [batch_size, num_classes].
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(x);
        let features = if self.frozen {
            features.detach()
        } else {
            features
        };
        self.head.forward(features)
    }

    /// Class probabilities of shape [batch_size, num_classes].
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x);
        burn::tensor::activation::softmax(logits, 1)
    }

    pub fn freeze_backbone(self) -> Self {
        Self { frozen: true, ..self }
    }

    pub fn unfreeze_backbone(self) -> Self {
        Self { frozen: false, ..self }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = LesionClassifier::<TestBackend>::new(BackboneKind::ResNet18, 7, 0.2, &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let logits = model.forward(input);
        assert_eq!(logits.dims(), [2, 7]);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = LesionClassifier::<TestBackend>::new(BackboneKind::ResNet18, 7, 0.2, &device);

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 64, 64],
            burn::tensor::Distribution::Default,
            &device,
        );
        let probs = model.forward_softmax(input);
        let sum: f32 = probs.sum().into_scalar().elem();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_freeze_round_trip() {
        let device = Default::default();
        let model = LesionClassifier::<TestBackend>::new(BackboneKind::ResNet18, 7, 0.2, &device);
        assert!(!model.is_frozen());

        let model = model.freeze_backbone();
        assert!(model.is_frozen());

        let model = model.unfreeze_backbone();
        assert!(!model.is_frozen());
    }
}
