//! Euler discrete scheduler
//!
//! Deterministic first-order ODE step in sigma space. The denoiser sees
//! `x / sqrt(σ² + 1)`, which keeps its input on the variance-preserving scale.

use burn::prelude::*;

use crate::noise::NoiseGenerator;
use crate::scheduler::{NoiseSchedule, ScheduleError, Scheduler, check_step_index};

/// Euler scheduler configuration
#[derive(Debug, Clone)]
pub struct EulerConfig {
    /// Number of inference steps
    pub num_inference_steps: usize,
}

impl Default for EulerConfig {
    fn default() -> Self {
        Self {
            num_inference_steps: 30,
        }
    }
}

/// Euler discrete scheduler
pub struct EulerScheduler {
    timesteps: Vec<usize>,
    /// Sigma at each timestep, followed by a trailing 0.0
    sigmas: Vec<f64>,
    init_noise_sigma: f64,
}

impl EulerScheduler {
    pub fn new(schedule: &NoiseSchedule, config: EulerConfig) -> Result<Self, ScheduleError> {
        let timesteps = schedule.inference_timesteps(config.num_inference_steps)?;
        let mut sigmas: Vec<f64> = timesteps.iter().map(|&t| schedule.sigma_at(t)).collect();
        let sigma_max = sigmas.iter().cloned().fold(0.0, f64::max);
        sigmas.push(0.0);

        Ok(Self {
            timesteps,
            sigmas,
            init_noise_sigma: (sigma_max * sigma_max + 1.0).sqrt(),
        })
    }

    /// Sigma values, one per step plus the final 0.0
    pub fn sigmas(&self) -> &[f64] {
        &self.sigmas
    }
}

impl<B: Backend> Scheduler<B> for EulerScheduler {
    fn timesteps(&self) -> &[usize] {
        &self.timesteps
    }

    fn init_noise_sigma(&self) -> f64 {
        self.init_noise_sigma
    }

    fn scale_model_input(&self, sample: Tensor<B, 4>, step_index: usize) -> Tensor<B, 4> {
        let sigma = self.sigmas[step_index.min(self.timesteps.len() - 1)];
        sample / (sigma * sigma + 1.0).sqrt()
    }

    fn step(
        &self,
        model_output: Tensor<B, 4>,
        step_index: usize,
        sample: Tensor<B, 4>,
        _noise: &mut NoiseGenerator,
    ) -> Result<Tensor<B, 4>, ScheduleError> {
        check_step_index(step_index, self.timesteps.len())?;
        let sigma = self.sigmas[step_index];
        let sigma_next = self.sigmas[step_index + 1];

        // denoised = x - σ ε, derivative = (x - denoised) / σ = ε
        let dt = sigma_next - sigma;
        Ok(sample + model_output * dt)
    }
}
