//! Checkpoint persistence.
//!
//! A checkpoint is a JSON bundle carrying training metadata alongside the
//! serialized model record; a bare weights file (just the record bytes) is
//! also accepted on load for interoperability with exported weights.
//!
//! Load failures are split three ways so callers can react correctly:
//! a missing file is recoverable (fresh start), while a structural
//! mismatch or a corrupt file is fatal.

use std::fs;
use std::path::Path;

use burn::module::Module;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::model::LesionClassifier;

type ByteRecorder = BinBytesRecorder<FullPrecisionSettings>;

/// On-disk checkpoint bundle.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckpointBundle {
    pub epoch: usize,
    pub loss: f64,
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
    /// Output classes of the saved model, checked against the target on load
    #[serde(default)]
    pub num_classes: usize,
    /// Parameter count of the saved model, checked against the target on load
    #[serde(default)]
    pub total_parameters: usize,
    /// Serialized model record
    pub model_state: Vec<u8>,
    /// Serialized optimizer record, absent for inference-only exports
    #[serde(default)]
    pub optimizer_state: Option<Vec<u8>>,
}

/// Metadata recovered from a loaded checkpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub loss: f64,
}

/// Save a full checkpoint bundle.
///
/// The write goes through a sibling temp file and a rename so a crash
/// mid-write never leaves a truncated checkpoint at the target path.
pub fn save_checkpoint<B: Backend>(
    model: &LesionClassifier<B>,
    epoch: usize,
    loss: f64,
    optimizer_state: Option<Vec<u8>>,
    path: &Path,
) -> Result<()> {
    let recorder = ByteRecorder::default();
    let model_state = recorder
        .record(model.clone().into_record(), ())
        .map_err(|e| Error::Serialization(format!("failed to serialize model record: {e}")))?;

    let bundle = CheckpointBundle {
        epoch,
        loss,
        saved_at: Utc::now(),
        num_classes: model.num_classes(),
        total_parameters: model.num_params(),
        model_state,
        optimizer_state,
    };

    write_atomic(path, &serde_json::to_vec(&bundle)?)?;
    info!("Saved checkpoint (epoch {epoch}, loss {loss:.4}) to {}", path.display());
    Ok(())
}

/// Save bare model weights without training metadata.
pub fn save_weights<B: Backend>(model: &LesionClassifier<B>, path: &Path) -> Result<()> {
    let recorder = ByteRecorder::default();
    let bytes = recorder
        .record(model.clone().into_record(), ())
        .map_err(|e| Error::Serialization(format!("failed to serialize model record: {e}")))?;

    write_atomic(path, &bytes)?;
    info!("Saved model weights to {}", path.display());
    Ok(())
}

/// Load a checkpoint into `model`.
///
/// Accepts either a full bundle or a bare weights file. Returns
/// [`Error::CheckpointMissing`] when nothing exists at `path`,
/// [`Error::ShapeMismatch`] when the stored record does not fit the
/// model's architecture, and [`Error::CheckpointCorrupt`] when the file
/// is readable as neither format.
pub fn load_checkpoint<B: Backend>(
    model: LesionClassifier<B>,
    path: &Path,
    device: &B::Device,
) -> Result<(LesionClassifier<B>, Option<CheckpointMeta>)> {
    if !path.is_file() {
        return Err(Error::CheckpointMissing(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;

    // A bundle is distinguished by the presence of the model_state key,
    // not by file extension.
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
        if value.get("model_state").is_some() {
            let bundle: CheckpointBundle = serde_json::from_value(value).map_err(|e| {
                Error::CheckpointCorrupt(format!(
                    "{}: bundle structure invalid: {e}",
                    path.display()
                ))
            })?;
            // The record itself carries no shape information the recorder
            // checks, so the bundle metadata is the authority here.
            if bundle.num_classes != 0 && bundle.num_classes != model.num_classes() {
                return Err(Error::ShapeMismatch(format!(
                    "{}: checkpoint was trained with {} classes but the model has {}",
                    path.display(),
                    bundle.num_classes,
                    model.num_classes()
                )));
            }
            if bundle.total_parameters != 0 && bundle.total_parameters != model.num_params() {
                return Err(Error::ShapeMismatch(format!(
                    "{}: checkpoint holds {} parameters but the model has {}",
                    path.display(),
                    bundle.total_parameters,
                    model.num_params()
                )));
            }
            let model = apply_record(model, bundle.model_state, device, path)?;
            info!(
                "Loaded checkpoint from {} (epoch {}, loss {:.4})",
                path.display(),
                bundle.epoch,
                bundle.loss
            );
            return Ok((
                model,
                Some(CheckpointMeta {
                    epoch: bundle.epoch,
                    loss: bundle.loss,
                }),
            ));
        }
    }

    // Not a bundle, try bare record bytes. Bare files carry no metadata,
    // so compare parameter counts before and after applying the record.
    let expected_params = model.num_params();
    let model = apply_record(model, bytes, device, path)?;
    if model.num_params() != expected_params {
        return Err(Error::ShapeMismatch(format!(
            "{}: weights file holds {} parameters but the model has {}",
            path.display(),
            model.num_params(),
            expected_params
        )));
    }
    info!("Loaded bare model weights from {}", path.display());
    Ok((model, None))
}

fn apply_record<B: Backend>(
    model: LesionClassifier<B>,
    bytes: Vec<u8>,
    device: &B::Device,
    path: &Path,
) -> Result<LesionClassifier<B>> {
    let recorder = ByteRecorder::default();
    // The recorder's deserializer panics on malformed input instead of
    // returning an error, so the call has to be fenced off.
    let loaded = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        recorder.load(bytes, device)
    }));
    let record = match loaded {
        Ok(Ok(record)) => record,
        Ok(Err(e)) => {
            return Err(Error::CheckpointCorrupt(format!(
                "{}: could not decode model record: {e}",
                path.display()
            )))
        }
        Err(_) => {
            return Err(Error::CheckpointCorrupt(format!(
                "{}: model record bytes are malformed",
                path.display()
            )))
        }
    };
    Ok(model.load_record(record))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    use crate::model::BackboneKind;

    type TestBackend = NdArray;

    fn small_model(num_classes: usize) -> LesionClassifier<TestBackend> {
        LesionClassifier::new(BackboneKind::ResNet18, num_classes, 0.2, &Default::default())
    }

    #[test]
    fn test_missing_checkpoint_is_distinct_error() {
        let device = Default::default();
        let err =
            load_checkpoint(small_model(7), Path::new("/nonexistent/ckpt.json"), &device)
                .unwrap_err();
        assert!(matches!(err, Error::CheckpointMissing(_)));
    }

    #[test]
    fn test_bundle_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt.json");
        let device = Default::default();

        let model = small_model(7);
        save_checkpoint(&model, 3, 0.42, None, &path).unwrap();

        let (_, meta) = load_checkpoint(small_model(7), &path, &device).unwrap();
        let meta = meta.unwrap();
        assert_eq!(meta.epoch, 3);
        assert!((meta.loss - 0.42).abs() < 1e-9);
    }

    #[test]
    fn test_bare_weights_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weights.bin");
        let device = Default::default();

        save_weights(&small_model(7), &path).unwrap();

        let (_, meta) = load_checkpoint(small_model(7), &path, &device).unwrap();
        assert!(meta.is_none());
    }

    #[test]
    fn test_shape_mismatch_is_fatal_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt.json");
        let device = Default::default();

        // Saved with 7 classes, loaded into a 5-class model.
        save_checkpoint(&small_model(7), 1, 1.0, None, &path).unwrap();
        let err = load_checkpoint(small_model(5), &path, &device).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn test_backbone_mismatch_is_fatal_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt.json");
        let device = Default::default();

        // Same class count, different architecture.
        let saved =
            LesionClassifier::<TestBackend>::new(BackboneKind::EfficientNetB0, 7, 0.2, &device);
        save_checkpoint(&saved, 1, 1.0, None, &path).unwrap();
        let err = load_checkpoint(small_model(7), &path, &device).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn test_bare_weights_shape_mismatch_is_fatal_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weights.bin");
        let device = Default::default();

        save_weights(&small_model(7), &path).unwrap();
        let err = load_checkpoint(small_model(5), &path, &device).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
    }

    #[test]
    fn test_corrupt_file_is_corrupt_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt.json");
        let device = Default::default();

        std::fs::write(&path, b"{\"model_state\": \"oops\"}").unwrap();
        let err = load_checkpoint(small_model(7), &path, &device).unwrap_err();
        assert!(matches!(err, Error::CheckpointCorrupt(_)));
    }

    #[test]
    fn test_garbage_bytes_fail_to_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weights.bin");
        let device = Default::default();

        std::fs::write(&path, vec![0u8; 64]).unwrap();
        let err = load_checkpoint(small_model(7), &path, &device).unwrap_err();
        assert!(matches!(err, Error::CheckpointCorrupt(_)));
    }
}
