//! Transfer-learning trainer for the lesion classifier.
//!
//! Runs forward/backward passes with automatic differentiation, steps an
//! Adam optimizer with weight decay, evaluates on the validation split
//! after every epoch, and persists both a rolling per-epoch checkpoint
//! and the best-so-far model.

use std::path::PathBuf;

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use tracing::{debug, info};

use crate::checkpoint;
use crate::config::TrainingSettings;
use crate::dataset::LesionBatch;
use crate::error::Result;
use crate::model::LesionClassifier;

/// Per-epoch aggregates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    pub loss: f64,
    pub accuracy: f64,
}

/// Mutable training progress, kept for monitoring and checkpoint metadata.
#[derive(Debug, Clone, Default)]
pub struct TrainingState {
    pub epoch: usize,
    pub best_val_loss: Option<f64>,
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    pub samples_seen: usize,
}

type AdamOptimizer<B> = burn::optim::adaptor::OptimizerAdaptor<
    burn::optim::Adam<<B as AutodiffBackend>::InnerBackend>,
    LesionClassifier<B>,
    B,
>;

pub struct Trainer<B: AutodiffBackend> {
    pub model: LesionClassifier<B>,
    optimizer: AdamOptimizer<B>,
    settings: TrainingSettings,
    pub state: TrainingState,
    checkpoint_dir: PathBuf,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(model: LesionClassifier<B>, settings: TrainingSettings) -> Self {
        let optimizer = AdamConfig::new()
            .with_weight_decay(Some(burn::optim::decay::WeightDecayConfig::new(
                settings.weight_decay,
            )))
            .init();

        let checkpoint_dir = settings.checkpoint_dir.clone();
        Self {
            model,
            optimizer,
            settings,
            state: TrainingState::default(),
            checkpoint_dir,
        }
    }

    /// Train on one epoch of batches, stepping the optimizer per batch.
    pub fn train_epoch(&mut self, batches: &[LesionBatch<B>]) -> EpochStats {
        let mut total_loss = 0.0;
        let mut correct = 0usize;
        let mut total = 0usize;
        let num_batches = batches.len();

        info!("Training epoch {} with {num_batches} batches", self.state.epoch + 1);

        for (batch_idx, batch) in batches.iter().enumerate() {
            let output = self.model.forward(batch.images.clone());

            let loss = CrossEntropyLossConfig::new()
                .init(&output.device())
                .forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            total_loss += loss_value;

            let predictions = output.argmax(1).squeeze::<1>(1);
            let batch_correct: i64 = predictions
                .equal(batch.targets.clone())
                .int()
                .sum()
                .into_scalar()
                .elem();
            correct += batch_correct as usize;
            total += batch.targets.dims()[0];

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model =
                self.optimizer
                    .step(self.settings.learning_rate, self.model.clone(), grads);

            self.state.samples_seen += batch.targets.dims()[0];

            if (batch_idx + 1) % 10 == 0 || batch_idx + 1 == num_batches {
                debug!(
                    "  Batch {}/{num_batches}: loss = {loss_value:.4}, acc = {:.2}%",
                    batch_idx + 1,
                    100.0 * correct as f64 / total.max(1) as f64
                );
            }
        }

        let stats = EpochStats {
            loss: if num_batches > 0 {
                total_loss / num_batches as f64
            } else {
                0.0
            },
            accuracy: if total > 0 {
                correct as f64 / total as f64
            } else {
                0.0
            },
        };
        self.state.train_losses.push(stats.loss);

        info!(
            "Epoch {} training: loss = {:.4}, accuracy = {:.2}%",
            self.state.epoch + 1,
            stats.loss,
            stats.accuracy * 100.0
        );
        stats
    }

    /// Evaluate on the validation split with the non-autodiff model.
    pub fn validate(&self, batches: &[LesionBatch<B::InnerBackend>]) -> EpochStats {
        let model_valid = self.model.valid();

        let mut total_loss = 0.0;
        let mut correct = 0usize;
        let mut total = 0usize;

        for batch in batches {
            let output = model_valid.forward(batch.images.clone());

            let loss = CrossEntropyLossConfig::new()
                .init(&output.device())
                .forward(output.clone(), batch.targets.clone());
            total_loss += loss.into_scalar().elem::<f64>();

            let predictions = output.argmax(1).squeeze::<1>(1);
            let batch_correct: i64 = predictions
                .equal(batch.targets.clone())
                .int()
                .sum()
                .into_scalar()
                .elem();
            correct += batch_correct as usize;
            total += batch.targets.dims()[0];
        }

        EpochStats {
            loss: if batches.is_empty() {
                0.0
            } else {
                total_loss / batches.len() as f64
            },
            accuracy: if total > 0 {
                correct as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    /// Close out an epoch: record validation loss, write the rolling
    /// checkpoint, and refresh the best-model file when validation
    /// improved. Returns true when this epoch was the best so far.
    pub fn end_epoch(&mut self, val: EpochStats) -> Result<bool> {
        self.state.val_losses.push(val.loss);

        let latest = self.checkpoint_dir.join("latest.json");
        checkpoint::save_checkpoint(
            &self.model.valid(),
            self.state.epoch,
            val.loss,
            None,
            &latest,
        )?;

        let improved = self
            .state
            .best_val_loss
            .map(|best| val.loss < best)
            .unwrap_or(true);
        if improved {
            self.state.best_val_loss = Some(val.loss);
            let best = self.checkpoint_dir.join("best_model.json");
            checkpoint::save_checkpoint(
                &self.model.valid(),
                self.state.epoch,
                val.loss,
                None,
                &best,
            )?;
            info!(
                "Epoch {}: new best validation loss {:.4}",
                self.state.epoch + 1,
                val.loss
            );
        }

        self.state.epoch += 1;
        Ok(improved)
    }

    pub fn num_epochs(&self) -> usize {
        self.settings.num_epochs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::prelude::*;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    use crate::dataset::LesionBatcher;
    use crate::model::BackboneKind;

    type TestBackend = Autodiff<NdArray>;

    fn tiny_trainer(dir: &TempDir) -> Trainer<TestBackend> {
        let device = Default::default();
        let model = LesionClassifier::<TestBackend>::new(BackboneKind::ResNet18, 3, 0.2, &device);
        let settings = TrainingSettings {
            num_epochs: 1,
            batch_size: 2,
            learning_rate: 0.001,
            weight_decay: 1e-4,
            num_workers: 1,
            checkpoint_dir: dir.path().to_path_buf(),
        };
        Trainer::new(model, settings)
    }

    fn tiny_batch<B: Backend>(device: &B::Device) -> LesionBatch<B> {
        use crate::dataset::LesionItem;
        use burn::data::dataloader::batcher::Batcher;

        let items = vec![
            LesionItem {
                image: vec![0.1; 3 * 16 * 16],
                label: 0,
                path: "a.jpg".into(),
            },
            LesionItem {
                image: vec![0.9; 3 * 16 * 16],
                label: 2,
                path: "b.jpg".into(),
            },
        ];
        LesionBatcher::<B>::new(device.clone(), 16).batch(items)
    }

    #[test]
    fn test_train_epoch_produces_finite_loss() {
        let dir = TempDir::new().unwrap();
        let mut trainer = tiny_trainer(&dir);
        let batch = tiny_batch::<TestBackend>(&Default::default());

        let stats = trainer.train_epoch(&[batch]);
        assert!(stats.loss.is_finite());
        assert!((0.0..=1.0).contains(&stats.accuracy));
        assert_eq!(trainer.state.samples_seen, 2);
    }

    #[test]
    fn test_end_epoch_writes_checkpoints() {
        let dir = TempDir::new().unwrap();
        let mut trainer = tiny_trainer(&dir);
        let val_batch = tiny_batch::<NdArray>(&Default::default());

        let val = trainer.validate(&[val_batch]);
        let improved = trainer.end_epoch(val).unwrap();

        assert!(improved);
        assert!(dir.path().join("latest.json").is_file());
        assert!(dir.path().join("best_model.json").is_file());
        assert_eq!(trainer.state.epoch, 1);
    }
}
