//! Model factory and architecture metadata.

pub mod backbone;
pub mod classifier;

pub use backbone::{Backbone, BackboneKind};
pub use classifier::{ClassifierHead, LesionClassifier};

use burn::module::Module;
use burn::tensor::backend::Backend;
use serde::Serialize;

use crate::config::ModelSettings;
use crate::error::Result;

/// Summary of a constructed model, reported by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub backbone: String,
    pub num_classes: usize,
    pub total_parameters: usize,
    pub input_size: u32,
}

/// Build a classifier from validated settings.
///
/// Rejects any backbone name that is not on the allow-list before any
/// weights are allocated.
pub fn build_model<B: Backend>(
    settings: &ModelSettings,
    device: &B::Device,
) -> Result<LesionClassifier<B>> {
    let kind = BackboneKind::parse(&settings.backbone)?;
    Ok(LesionClassifier::new(
        kind,
        settings.num_classes,
        settings.dropout,
        device,
    ))
}

/// Describe a constructed model.
pub fn model_info<B: Backend>(
    model: &LesionClassifier<B>,
    settings: &ModelSettings,
    input_size: u32,
) -> ModelInfo {
    ModelInfo {
        name: format!("{}_lesion_classifier", settings.backbone),
        backbone: settings.backbone.clone(),
        num_classes: model.num_classes(),
        total_parameters: model.num_params(),
        input_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    use crate::config::ModelSettings;

    type TestBackend = NdArray;

    #[test]
    fn test_factory_rejects_unknown_backbone() {
        let device = Default::default();
        let settings = ModelSettings {
            backbone: "mobilenet_v3".to_string(),
            ..Default::default()
        };
        assert!(build_model::<TestBackend>(&settings, &device).is_err());
    }

    #[test]
    fn test_factory_builds_default() {
        let device = Default::default();
        let settings = ModelSettings {
            backbone: "resnet18".to_string(),
            ..Default::default()
        };
        let model = build_model::<TestBackend>(&settings, &device).unwrap();
        assert_eq!(model.num_classes(), 7);

        let info = model_info(&model, &settings, 224);
        assert_eq!(info.backbone, "resnet18");
        assert!(info.total_parameters > 0);
        assert_eq!(info.input_size, 224);
    }
}
