//! Skin lesion image classification: dataset pipeline, transfer-learning
//! model, training loop, and an HTTP inference API.

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod model;
pub mod server;
pub mod taxonomy;
pub mod training;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use inference::InferenceService;
pub use model::LesionClassifier;
pub use taxonomy::{ClassTaxonomy, RiskPolicy, RiskTier};

/// Number of diagnostic classes in the HAM10000 taxonomy.
pub const NUM_CLASSES: usize = 7;

/// Model input resolution (square).
pub const IMAGE_SIZE: u32 = 224;
