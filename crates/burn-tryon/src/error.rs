use burn_tryon_image::ConditioningError;
use burn_tryon_samplers::ScheduleError;
use thiserror::Error;

use crate::pipeline::InferenceState;

#[derive(Error, Debug)]
pub enum TryOnError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Conditioning error: {0}")]
    Conditioning(#[from] ConditioningError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Denoiser output shape {actual:?} does not match latent shape {expected:?}")]
    DenoiserOutput {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Non-finite values in {name}: {stats}")]
    NonFinite { name: String, stats: String },

    #[error("Invalid inference state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: InferenceState,
        to: InferenceState,
    },

    #[error("Tensor data error: {0}")]
    TensorData(String),
}
