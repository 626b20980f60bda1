//! Configuration structures for the dermalens classifier.
//!
//! All parameters are read once at process start; nothing here is mutated at
//! runtime. Defaults reproduce the reference setup (HAM10000, 224x224,
//! ImageNet normalization).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::taxonomy::RiskPolicy;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Model configuration
    pub model: ModelSettings,
    /// Data pipeline configuration
    pub data: DataSettings,
    /// Training hyperparameters
    pub training: TrainingSettings,
    /// HTTP API configuration
    pub api: ApiSettings,
    /// Risk-tier presentation policy
    pub risk: RiskPolicy,
}

/// Model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Backbone architecture name (must be on the factory allow-list)
    pub backbone: String,
    /// Number of output classes
    pub num_classes: usize,
    /// Whether a trained checkpoint is expected at startup
    pub pretrained: bool,
    /// Dropout rate for the classification head
    pub dropout: f64,
    /// Path to the checkpoint loaded at inference startup
    pub checkpoint_path: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            backbone: "efficientnet_b0".to_string(),
            num_classes: 7,
            pretrained: true,
            dropout: 0.2,
            checkpoint_path: PathBuf::from("models/trained/best_model.json"),
        }
    }
}

/// Data pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    /// Directory containing lesion images
    pub image_dir: PathBuf,
    /// Path to the metadata CSV
    pub metadata_path: PathBuf,
    /// Target image size (square)
    pub image_size: u32,
    /// Extra margin added before the training-time random crop
    pub crop_margin: u32,
    /// Per-channel normalization mean (RGB)
    pub normalize_mean: [f32; 3],
    /// Per-channel normalization std (RGB)
    pub normalize_std: [f32; 3],
    /// Fraction of all samples held out for validation
    pub validation_fraction: f64,
    /// Fraction of all samples held out for test
    pub test_fraction: f64,
    /// Random seed for splits and augmentation
    pub seed: u64,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("data/ham10000/images"),
            metadata_path: PathBuf::from("data/ham10000/metadata/HAM10000_metadata.csv"),
            image_size: 224,
            crop_margin: 32,
            normalize_mean: [0.485, 0.456, 0.406],
            normalize_std: [0.229, 0.224, 0.225],
            validation_fraction: 0.2,
            test_fraction: 0.1,
            seed: 42,
        }
    }
}

/// Training hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Number of training epochs
    pub num_epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Learning rate
    pub learning_rate: f64,
    /// Weight decay (L2 regularization)
    pub weight_decay: f64,
    /// Number of data loading workers
    pub num_workers: usize,
    /// Directory for per-epoch checkpoints
    pub checkpoint_dir: PathBuf,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 50,
            batch_size: 32,
            learning_rate: 0.001,
            weight_decay: 1e-4,
            num_workers: 4,
            checkpoint_dir: PathBuf::from("models/checkpoints"),
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Wall-clock bound per inference request, in seconds
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;

        let config: AppConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config {}: {e}", path.display()))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.model.num_classes == 0 {
            return Err(Error::Config("num_classes must be greater than 0".into()));
        }

        for (name, frac) in [
            ("validation_fraction", self.data.validation_fraction),
            ("test_fraction", self.data.test_fraction),
        ] {
            if !(0.0..=1.0).contains(&frac) {
                return Err(Error::Config(format!(
                    "{name} must be between 0.0 and 1.0, got {frac}"
                )));
            }
        }

        // The remainder after validation + test is the training set; the two
        // fractions may consume everything but never more than everything.
        let held_out = self.data.validation_fraction + self.data.test_fraction;
        if held_out > 1.0 {
            return Err(Error::Config(format!(
                "validation_fraction + test_fraction must not exceed 1.0, got {held_out}"
            )));
        }

        if self.data.image_size == 0 {
            return Err(Error::Config("image_size must be greater than 0".into()));
        }

        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(Error::Config(format!(
                "dropout must be in [0.0, 1.0), got {}",
                self.model.dropout
            )));
        }

        Ok(())
    }
}
