//! Noise schedules and the scheduler interface

use burn::prelude::*;
use thiserror::Error;

use crate::noise::NoiseGenerator;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Number of inference steps must be positive")]
    ZeroSteps,

    #[error("{requested} inference steps do not fit in {train_steps} training steps")]
    TooManySteps {
        requested: usize,
        train_steps: usize,
    },

    #[error("Step index {index} out of range for {len} steps")]
    StepOutOfRange { index: usize, len: usize },
}

/// Spacing of betas over the training steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BetaSchedule {
    /// Betas linear in beta
    Linear,
    /// Betas linear in sqrt(beta) (Stable Diffusion)
    #[default]
    ScaledLinear,
}

/// Training noise schedule configuration
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Number of training timesteps
    pub num_train_steps: usize,
    pub beta_start: f64,
    pub beta_end: f64,
    pub beta_schedule: BetaSchedule,
    /// Added to every inference timestep ("leading" spacing)
    pub steps_offset: usize,
    /// Use 1.0 as the alpha past the last step instead of ᾱ₀
    pub set_alpha_to_one: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::sd_inpainting()
    }
}

impl ScheduleConfig {
    /// Schedule the SD 1.5 inpainting denoiser was trained with
    pub fn sd_inpainting() -> Self {
        Self {
            num_train_steps: 1000,
            beta_start: 0.00085,
            beta_end: 0.012,
            beta_schedule: BetaSchedule::ScaledLinear,
            steps_offset: 1,
            set_alpha_to_one: false,
        }
    }
}

/// Precomputed cumulative alphas shared by every scheduler
///
/// Loaded once and read concurrently; schedulers copy what they need.
#[derive(Debug, Clone)]
pub struct NoiseSchedule {
    /// Cumulative product of alphas: ᾱₜ
    alphas_cumprod: Vec<f64>,
    /// ᾱ used after the final inference step
    final_alpha_cumprod: f64,
    steps_offset: usize,
}

impl NoiseSchedule {
    pub fn new(config: &ScheduleConfig) -> Self {
        let n = config.num_train_steps;
        let betas: Vec<f64> = match config.beta_schedule {
            BetaSchedule::Linear => linspace(config.beta_start, config.beta_end, n),
            BetaSchedule::ScaledLinear => {
                linspace(config.beta_start.sqrt(), config.beta_end.sqrt(), n)
                    .into_iter()
                    .map(|b| b * b)
                    .collect()
            }
        };

        let mut alphas_cumprod = Vec::with_capacity(n);
        let mut cumprod = 1.0f64;
        for beta in betas {
            cumprod *= 1.0 - beta;
            alphas_cumprod.push(cumprod);
        }

        let final_alpha_cumprod = if config.set_alpha_to_one {
            1.0
        } else {
            alphas_cumprod.first().copied().unwrap_or(1.0)
        };

        Self {
            alphas_cumprod,
            final_alpha_cumprod,
            steps_offset: config.steps_offset,
        }
    }

    /// Default SD inpainting schedule
    pub fn sd_inpainting() -> Self {
        Self::new(&ScheduleConfig::sd_inpainting())
    }

    pub fn num_train_steps(&self) -> usize {
        self.alphas_cumprod.len()
    }

    /// ᾱ at training timestep `t`
    pub fn alpha_cumprod_at(&self, t: usize) -> f64 {
        let last = self.alphas_cumprod.len().saturating_sub(1);
        self.alphas_cumprod.get(t.min(last)).copied().unwrap_or(1.0)
    }

    pub fn final_alpha_cumprod(&self) -> f64 {
        self.final_alpha_cumprod
    }

    /// σ = sqrt((1 - ᾱ) / ᾱ) at training timestep `t`
    pub fn sigma_at(&self, t: usize) -> f64 {
        let alpha = self.alpha_cumprod_at(t);
        ((1.0 - alpha) / alpha).sqrt()
    }

    /// Strictly decreasing inference timesteps with "leading" spacing
    ///
    /// For 50 steps over 1000 training steps with offset 1: 981, 961, ..., 1.
    pub fn inference_timesteps(
        &self,
        num_inference_steps: usize,
    ) -> Result<Vec<usize>, ScheduleError> {
        let train_steps = self.num_train_steps();
        if num_inference_steps == 0 {
            return Err(ScheduleError::ZeroSteps);
        }
        let step_ratio = train_steps / num_inference_steps;
        let last = (num_inference_steps - 1) * step_ratio + self.steps_offset;
        if step_ratio == 0 || last >= train_steps {
            return Err(ScheduleError::TooManySteps {
                requested: num_inference_steps,
                train_steps,
            });
        }

        Ok((0..num_inference_steps)
            .rev()
            .map(|i| i * step_ratio + self.steps_offset)
            .collect())
    }
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![start; n];
    }
    (0..n)
        .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
        .collect()
}

/// Step-update rule driving the denoising loop
///
/// A scheduler is built per inference call for a fixed number of steps and
/// consumed in order: `step_index` runs from 0 to `num_steps() - 1`.
pub trait Scheduler<B: Backend> {
    /// Inference timesteps, highest noise first
    fn timesteps(&self) -> &[usize];

    fn num_steps(&self) -> usize {
        self.timesteps().len()
    }

    /// Standard deviation of the initial latent noise
    fn init_noise_sigma(&self) -> f64;

    /// Scale the denoiser input for the current step
    fn scale_model_input(&self, sample: Tensor<B, 4>, step_index: usize) -> Tensor<B, 4>;

    /// Compute the previous (less noisy) sample from a noise prediction
    fn step(
        &self,
        model_output: Tensor<B, 4>,
        step_index: usize,
        sample: Tensor<B, 4>,
        noise: &mut NoiseGenerator,
    ) -> Result<Tensor<B, 4>, ScheduleError>;
}

pub(crate) fn check_step_index(index: usize, len: usize) -> Result<(), ScheduleError> {
    if index < len {
        Ok(())
    } else {
        Err(ScheduleError::StepOutOfRange { index, len })
    }
}
