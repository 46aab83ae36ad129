//! Try-on pipeline configuration, step callbacks and inference state

// step_idx indexes the timestep tensors and drives scheduler.step()
#![allow(clippy::needless_range_loop)]

mod tryon;

pub use tryon::TryOnPipeline;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::TryOnError;

/// Scheduler algorithm selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    /// DDIM with configurable eta (default)
    #[default]
    Ddim,
    /// Euler discrete, deterministic
    Euler,
}

/// Debug flags for pipeline and scheduler diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log latent statistics at every step
    pub sampler: bool,
    /// Fail the call on NaN/Inf values in tensors
    pub nan: bool,
}

/// Configuration for one try-on call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TryOnConfig {
    pub width: usize,
    pub height: usize,
    pub steps: usize,
    pub guidance_scale: f64,
    pub seed: Option<u64>,
    /// Scheduler algorithm (default: DDIM)
    pub scheduler: SchedulerKind,
    /// DDIM eta (0.0 = deterministic)
    pub eta: f64,
    /// Run the safety checker on decoded images
    pub safety_check: bool,
    /// Debug output flags
    pub debug: DebugConfig,
}

impl Default for TryOnConfig {
    fn default() -> Self {
        Self {
            width: 768,
            height: 1024,
            steps: 50,
            guidance_scale: 2.5,
            seed: None,
            scheduler: SchedulerKind::default(),
            eta: 1.0,
            safety_check: false,
            debug: DebugConfig::default(),
        }
    }
}

impl TryOnConfig {
    pub fn with_size(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_guidance_scale(mut self, guidance_scale: f64) -> Self {
        self.guidance_scale = guidance_scale;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerKind) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_eta(mut self, eta: f64) -> Self {
        self.eta = eta;
        self
    }

    /// Check values that would otherwise fail deep inside the loop
    ///
    /// `downscale` is the encoder's spatial downscale factor.
    pub fn validate(&self, downscale: usize) -> Result<(), TryOnError> {
        let downscale = downscale.max(1);
        if self.width == 0
            || self.height == 0
            || self.width % downscale != 0
            || self.height % downscale != 0
        {
            return Err(TryOnError::InvalidConfig(format!(
                "resolution {}x{} must be a positive multiple of {}",
                self.width, self.height, downscale
            )));
        }
        if self.steps == 0 {
            return Err(TryOnError::InvalidConfig("steps must be positive".into()));
        }
        if self.guidance_scale.is_nan() || self.guidance_scale < 0.0 {
            return Err(TryOnError::InvalidConfig(format!(
                "guidance scale must be >= 0, got {}",
                self.guidance_scale
            )));
        }
        if self.eta.is_nan() || self.eta < 0.0 {
            return Err(TryOnError::InvalidConfig(format!(
                "eta must be >= 0, got {}",
                self.eta
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Inference State
// ============================================================================

/// Lifecycle of one inference call
///
/// `NotStarted -> Running(0..=N) -> Decoding -> Done`. There is no way back
/// to `Running` once decoding starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceState {
    NotStarted,
    /// `step` denoising steps of `total` completed
    Running { step: usize, total: usize },
    Decoding,
    Done,
}

impl InferenceState {
    /// Move to `next`, rejecting anything but the forward transitions
    pub fn transition(self, next: InferenceState) -> Result<InferenceState, TryOnError> {
        use InferenceState::*;

        let allowed = match (self, next) {
            (NotStarted, Running { step: 0, total }) => total > 0,
            (Running { step, total }, Running { step: next_step, total: next_total }) => {
                total == next_total && next_step == step + 1 && next_step <= total
            }
            (Running { step, total }, Decoding) => step == total,
            (Decoding, Done) => true,
            _ => false,
        };

        if allowed {
            Ok(next)
        } else {
            Err(TryOnError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Record one completed denoising step
    pub fn complete_step(self) -> Result<InferenceState, TryOnError> {
        match self {
            InferenceState::Running { step, total } => self.transition(InferenceState::Running {
                step: step + 1,
                total,
            }),
            other => Err(TryOnError::InvalidTransition {
                from: other,
                to: other,
            }),
        }
    }
}

// ============================================================================
// Step Callback Types
// ============================================================================

/// What to output at each sampling step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StepOutput {
    /// No output, minimal overhead
    #[default]
    None,
    /// Raw composite latent tensor
    Latent,
    /// Person half decoded to [0, 1] (expensive, one decoder call per step)
    Decoded,
}

/// Information passed to step callback
pub struct StepInfo<B: Backend> {
    /// Current step (0-indexed)
    pub step: usize,
    /// Total number of steps
    pub total_steps: usize,
    /// Current timestep value
    pub timestep: usize,
    /// State after this step
    pub state: InferenceState,
    /// Output based on StepOutput setting
    pub output: Option<Tensor<B, 4>>,
}

/// One-line summary of a tensor for debug logs
///
/// Min, max, mean and std are taken over finite values; NaN and Inf are
/// counted separately.
pub fn tensor_stats<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> String {
    let values: Vec<f32> = match tensor.clone().into_data().convert::<f32>().to_vec() {
        Ok(values) => values,
        Err(e) => return format!("unreadable ({:?})", e),
    };

    let (mut n, mut sum, mut sum_sq) = (0usize, 0.0f64, 0.0f64);
    let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
    let (mut nan, mut inf) = (0usize, 0usize);
    for &v in &values {
        if v.is_nan() {
            nan += 1;
        } else if v.is_infinite() {
            inf += 1;
        } else {
            n += 1;
            sum += v as f64;
            sum_sq += (v as f64) * (v as f64);
            min = min.min(v);
            max = max.max(v);
        }
    }

    if n == 0 && nan == 0 && inf == 0 {
        return "empty".to_string();
    }
    let mean = if n > 0 { sum / n as f64 } else { f64::NAN };
    let std = if n > 0 {
        (sum_sq / n as f64 - mean * mean).max(0.0).sqrt()
    } else {
        f64::NAN
    };

    let mut stats = format!(
        "shape={:?} min={:.4} max={:.4} mean={:.4} std={:.4}",
        tensor.dims(),
        min,
        max,
        mean,
        std
    );
    if nan > 0 || inf > 0 {
        stats.push_str(&format!(" [NaN={}, Inf={}]", nan, inf));
    }
    stats
}

/// Check tensor for NaN/Inf values
///
/// When `enabled` is true, returns `NonFinite` if NaN or Inf is detected.
#[inline]
pub(crate) fn check_tensor_if<B: Backend, const D: usize>(
    tensor: &Tensor<B, D>,
    name: &str,
    enabled: bool,
) -> Result<(), TryOnError> {
    if !enabled {
        return Ok(());
    }

    let floats: Vec<f32> = tensor
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| TryOnError::TensorData(format!("{:?}", e)))?;

    if floats.iter().any(|x| !x.is_finite()) {
        return Err(TryOnError::NonFinite {
            name: name.to_string(),
            stats: tensor_stats(tensor),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_tryon_config_default() {
        let config = TryOnConfig::default();
        assert_eq!(config.width, 768);
        assert_eq!(config.height, 1024);
        assert_eq!(config.steps, 50);
        assert_eq!(config.guidance_scale, 2.5);
        assert_eq!(config.scheduler, SchedulerKind::Ddim);
        assert!(config.validate(8).is_ok());
    }

    #[test]
    fn test_tryon_config_validate() {
        assert!(TryOnConfig::default().with_size(770, 1024).validate(8).is_err());
        assert!(TryOnConfig::default().with_steps(0).validate(8).is_err());
        assert!(TryOnConfig::default().with_guidance_scale(-1.0).validate(8).is_err());
        assert!(TryOnConfig::default().with_guidance_scale(f64::NAN).validate(8).is_err());
        assert!(TryOnConfig::default().with_guidance_scale(0.0).validate(8).is_ok());
    }

    #[test]
    fn test_tryon_config_json() {
        let config: TryOnConfig =
            serde_json::from_str(r#"{"steps": 15, "seed": 42, "scheduler": "euler"}"#).unwrap();
        assert_eq!(config.steps, 15);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.scheduler, SchedulerKind::Euler);
        // Unspecified fields keep their defaults
        assert_eq!(config.width, 768);
        assert_eq!(config.eta, 1.0);
    }

    #[test]
    fn test_state_forward_transitions() {
        let state = InferenceState::NotStarted
            .transition(InferenceState::Running { step: 0, total: 2 })
            .unwrap();
        let state = state.complete_step().unwrap().complete_step().unwrap();
        assert_eq!(state, InferenceState::Running { step: 2, total: 2 });
        let state = state.transition(InferenceState::Decoding).unwrap();
        assert_eq!(
            state.transition(InferenceState::Done).unwrap(),
            InferenceState::Done
        );
    }

    #[test]
    fn test_state_rejects_backward_transitions() {
        assert!(InferenceState::Decoding
            .transition(InferenceState::Running { step: 0, total: 2 })
            .is_err());
        assert!(InferenceState::Decoding.complete_step().is_err());
        assert!(InferenceState::Done
            .transition(InferenceState::Decoding)
            .is_err());
        // Decoding before every step has run
        assert!(InferenceState::Running { step: 1, total: 2 }
            .transition(InferenceState::Decoding)
            .is_err());
        // No steps past the total
        assert!(InferenceState::Running { step: 2, total: 2 }
            .complete_step()
            .is_err());
    }

    #[test]
    fn test_check_tensor_if() {
        let device = Default::default();
        let finite = Tensor::<TestBackend, 2>::ones([2, 2], &device);
        assert!(check_tensor_if(&finite, "finite", true).is_ok());

        let nan = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, f32::NAN], [1, 2]),
            &device,
        );
        assert!(check_tensor_if(&nan, "nan", false).is_ok());
        assert!(matches!(
            check_tensor_if(&nan, "nan", true),
            Err(TryOnError::NonFinite { .. })
        ));
        assert!(tensor_stats(&nan).contains("NaN=1"));
    }
}
