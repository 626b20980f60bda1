//! Training pipeline: epoch loop, validation, and checkpointing.

pub mod trainer;

pub use trainer::{EpochStats, Trainer, TrainingState};
