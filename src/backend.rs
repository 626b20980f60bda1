//! Backend selection for the Burn framework.
//!
//! The service assumes a single fixed execution device for its lifetime;
//! device placement is a build-time concern, not a runtime negotiation.

use burn::backend::Autodiff;
use burn_ndarray::NdArray;

/// Backend used for inference (no gradient tracking).
pub type InferenceBackend = NdArray;

/// Autodiff backend used for training.
pub type TrainingBackend = Autodiff<InferenceBackend>;

/// Device handle for the inference backend.
pub type InferenceDevice = <InferenceBackend as burn::tensor::backend::Backend>::Device;

/// Get the default device.
pub fn default_device() -> InferenceDevice {
    InferenceDevice::default()
}

/// Human-readable name for the compiled backend.
pub fn backend_name() -> &'static str {
    "ndarray (CPU)"
}
