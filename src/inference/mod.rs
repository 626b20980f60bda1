//! Inference: single-image and batch prediction with risk tiering.

pub mod service;

pub use service::{InferenceService, Prediction, PredictionOutcome};
