//! Inference service.
//!
//! Owns the loaded model, the evaluation transform, the class taxonomy,
//! and the risk policy. Handlers receive it behind an `Arc`; there is no
//! global model state. Batch prediction funnels every image through the
//! same single-image routine so one bad upload never poisons its
//! neighbors.
//!
//! Weights are never mutated after load, but the model sits behind a
//! mutex anyway: Burn parameters carry lazy-init cells that are `Send`
//! without being `Sync`, so the lock is what makes the service shareable
//! across request handler threads.

use std::sync::Mutex;

use burn::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::backend::{default_device, InferenceBackend, InferenceDevice};
use crate::checkpoint;
use crate::config::AppConfig;
use crate::dataset::EvalTransform;
use crate::error::{Error, Result};
use crate::model::{build_model, model_info, LesionClassifier, ModelInfo};
use crate::taxonomy::{ClassTaxonomy, RiskPolicy, RiskTier};

/// Images smaller than this on either side carry too little signal to
/// classify meaningfully.
const MIN_DIMENSION: u32 = 32;

/// How many ranked classes a prediction reports.
const TOP_K: usize = 3;

/// One ranked class prediction. Confidence is a percentage in [0, 100].
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub class_code: String,
    pub description: String,
    pub confidence: f32,
}

/// Full outcome for one image: ranked predictions plus the risk tier
/// derived from the top prediction.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionOutcome {
    pub predictions: Vec<Prediction>,
    pub risk_tier: RiskTier,
}

pub struct InferenceService {
    model: Mutex<LesionClassifier<InferenceBackend>>,
    taxonomy: ClassTaxonomy,
    transform: EvalTransform,
    policy: RiskPolicy,
    device: InferenceDevice,
    info: ModelInfo,
    checkpoint_loaded: bool,
}

impl InferenceService {
    /// Build the service from configuration: construct the model, then
    /// load the configured checkpoint.
    ///
    /// A missing checkpoint degrades to untrained weights with a warning
    /// so development setups can still exercise the API; a checkpoint
    /// that exists but cannot be applied is fatal.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let device = default_device();
        let model = build_model::<InferenceBackend>(&config.model, &device)?;
        let info = model_info(&model, &config.model, config.data.image_size);

        let (model, checkpoint_loaded) =
            match checkpoint::load_checkpoint(model, &config.model.checkpoint_path, &device) {
                Ok((model, _)) => (model, true),
                Err(Error::CheckpointMissing(path)) => {
                    warn!(
                        "No checkpoint at {}, serving untrained weights",
                        path.display()
                    );
                    (
                        build_model::<InferenceBackend>(&config.model, &device)?,
                        false,
                    )
                }
                Err(e) => return Err(e),
            };

        info!(
            "Inference service ready: {} ({} parameters)",
            info.name, info.total_parameters
        );

        Ok(Self {
            model: Mutex::new(model),
            taxonomy: ClassTaxonomy::ham10000(),
            transform: EvalTransform::from_settings(&config.data),
            policy: config.risk.clone(),
            device,
            info,
            checkpoint_loaded,
        })
    }

    /// Classify one encoded image.
    ///
    /// Returns the top ranked classes by probability and the risk tier
    /// of the most likely class. Decode and size failures are client
    /// faults; everything past the transform is a server fault.
    pub fn predict(&self, image_bytes: &[u8]) -> Result<PredictionOutcome> {
        let image = image::load_from_memory(image_bytes)
            .map_err(|e| Error::InvalidInput(format!("could not decode image: {e}")))?;

        let (width, height) = (image.width(), image.height());
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            return Err(Error::InvalidInput(format!(
                "image too small: {width}x{height}, minimum is {MIN_DIMENSION}x{MIN_DIMENSION}"
            )));
        }

        let data = self.transform.apply(&image);
        let size = self.transform.size as usize;
        let input = Tensor::<InferenceBackend, 4>::from_floats(
            TensorData::new(data, [1, 3, size, size]),
            &self.device,
        );

        // The forward pass is read-only; a poisoned lock only means a
        // sibling request panicked mid-forward, so recover the guard.
        let model = self.model.lock().unwrap_or_else(|e| e.into_inner());
        let probs = model.forward_softmax(input);
        drop(model);
        let probs: Vec<f32> = probs
            .into_data()
            .to_vec()
            .map_err(|e| Error::Inference(format!("failed to read probabilities: {e:?}")))?;

        self.rank(&probs)
    }

    /// Classify a batch of encoded images with per-image fault isolation.
    ///
    /// The output has one slot per input, in order; a failure in one slot
    /// never affects the others.
    pub fn predict_batch(&self, images: &[Vec<u8>]) -> Vec<Result<PredictionOutcome>> {
        images.iter().map(|bytes| self.predict(bytes)).collect()
    }

    fn rank(&self, probs: &[f32]) -> Result<PredictionOutcome> {
        if probs.len() != self.taxonomy.len() {
            return Err(Error::Inference(format!(
                "model emitted {} probabilities for {} classes",
                probs.len(),
                self.taxonomy.len()
            )));
        }

        let mut order: Vec<usize> = (0..probs.len()).collect();
        order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

        let predictions: Vec<Prediction> = order
            .iter()
            .take(TOP_K.min(probs.len()))
            .map(|&i| {
                let class = self.taxonomy.require(i)?;
                Ok(Prediction {
                    class_code: class.code.clone(),
                    description: class.description.clone(),
                    confidence: probs[i] * 100.0,
                })
            })
            .collect::<Result<_>>()?;

        let top = &predictions[0];
        let risk_tier = self.policy.risk_tier(&top.class_code, top.confidence);

        Ok(PredictionOutcome {
            predictions,
            risk_tier,
        })
    }

    pub fn taxonomy(&self) -> &ClassTaxonomy {
        &self.taxonomy
    }

    pub fn model_info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn checkpoint_loaded(&self) -> bool {
        self.checkpoint_loaded
    }
}
