//! DDIM (Denoising Diffusion Implicit Models) scheduler
//!
//! Follows the diffusers formulation used by SD inpainting checkpoints:
//! epsilon prediction, no sample clipping, optional stochasticity via `eta`.

use burn::prelude::*;

use crate::noise::NoiseGenerator;
use crate::scheduler::{NoiseSchedule, ScheduleError, Scheduler, check_step_index};

/// DDIM scheduler configuration
#[derive(Debug, Clone)]
pub struct DdimConfig {
    /// Number of inference steps
    pub num_inference_steps: usize,
    /// Eta parameter (0.0 = deterministic DDIM, 1.0 = DDPM-like variance)
    pub eta: f64,
}

impl Default for DdimConfig {
    fn default() -> Self {
        Self {
            num_inference_steps: 50,
            eta: 0.0,
        }
    }
}

/// DDIM scheduler for a fixed number of steps
pub struct DdimScheduler {
    config: DdimConfig,
    timesteps: Vec<usize>,
    /// (ᾱₜ, ᾱₜ₋₁) for each step
    alphas: Vec<(f64, f64)>,
}

impl DdimScheduler {
    pub fn new(schedule: &NoiseSchedule, config: DdimConfig) -> Result<Self, ScheduleError> {
        let timesteps = schedule.inference_timesteps(config.num_inference_steps)?;
        let alphas = timesteps
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let alpha_prev = match timesteps.get(i + 1) {
                    Some(&prev) => schedule.alpha_cumprod_at(prev),
                    None => schedule.final_alpha_cumprod(),
                };
                (schedule.alpha_cumprod_at(t), alpha_prev)
            })
            .collect();

        Ok(Self {
            config,
            timesteps,
            alphas,
        })
    }

    pub fn eta(&self) -> f64 {
        self.config.eta
    }

    /// Standard deviation of the noise added at `step_index`
    pub fn step_std(&self, step_index: usize) -> f64 {
        let (alpha_t, alpha_prev) = self.alphas[step_index];
        let variance = (1.0 - alpha_prev) / (1.0 - alpha_t) * (1.0 - alpha_t / alpha_prev);
        self.config.eta * variance.max(0.0).sqrt()
    }
}

impl<B: Backend> Scheduler<B> for DdimScheduler {
    fn timesteps(&self) -> &[usize] {
        &self.timesteps
    }

    fn init_noise_sigma(&self) -> f64 {
        1.0
    }

    fn scale_model_input(&self, sample: Tensor<B, 4>, _step_index: usize) -> Tensor<B, 4> {
        sample
    }

    fn step(
        &self,
        model_output: Tensor<B, 4>,
        step_index: usize,
        sample: Tensor<B, 4>,
        noise: &mut NoiseGenerator,
    ) -> Result<Tensor<B, 4>, ScheduleError> {
        check_step_index(step_index, self.timesteps.len())?;
        let (alpha_t, alpha_prev) = self.alphas[step_index];

        // pred_x0 = (x_t - sqrt(1-ᾱₜ) * ε) / sqrt(ᾱₜ)
        let pred_x0 =
            (sample.clone() - model_output.clone() * (1.0 - alpha_t).sqrt()) / alpha_t.sqrt();

        let std = self.step_std(step_index);
        let dir_coef = (1.0 - alpha_prev - std * std).max(0.0).sqrt();
        let prev_sample = pred_x0 * alpha_prev.sqrt() + model_output * dir_coef;

        if self.config.eta > 0.0 {
            let variance_noise = noise.normal::<B, 4>(sample.dims(), &sample.device());
            Ok(prev_sample + variance_noise * std)
        } else {
            Ok(prev_sample)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn to_vec(tensor: Tensor<TestBackend, 4>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_ddim_config_default() {
        let config = DdimConfig::default();
        assert_eq!(config.num_inference_steps, 50);
        assert_eq!(config.eta, 0.0);
    }

    #[test]
    fn test_deterministic_step_follows_true_noise() {
        // With the exact noise, a deterministic step lands on
        // sqrt(ᾱₜ₋₁) x0 + sqrt(1 - ᾱₜ₋₁) ε
        let device = Default::default();
        let schedule = NoiseSchedule::sd_inpainting();
        let scheduler = DdimScheduler::new(
            &schedule,
            DdimConfig {
                num_inference_steps: 10,
                eta: 0.0,
            },
        )
        .unwrap();
        let (alpha_t, alpha_prev) = scheduler.alphas[3];

        let x0 = Tensor::<TestBackend, 4>::full([1, 4, 2, 2], 0.5, &device);
        let eps = Tensor::<TestBackend, 4>::full([1, 4, 2, 2], -1.0, &device);
        let x_t = x0.clone() * alpha_t.sqrt() + eps.clone() * (1.0 - alpha_t).sqrt();

        let mut noise = NoiseGenerator::from_seed(0);
        let prev = scheduler.step(eps, 3, x_t, &mut noise).unwrap();

        let expected = 0.5 * alpha_prev.sqrt() - (1.0 - alpha_prev).sqrt();
        for v in to_vec(prev) {
            assert!((v as f64 - expected).abs() < 1e-5, "{} vs {}", v, expected);
        }
    }

    #[test]
    fn test_final_step_uses_first_alpha() {
        let schedule = NoiseSchedule::sd_inpainting();
        let scheduler = DdimScheduler::new(&schedule, DdimConfig::default()).unwrap();
        let (_, alpha_prev) = scheduler.alphas[49];
        assert_eq!(alpha_prev, schedule.alpha_cumprod_at(0));
    }

    #[test]
    fn test_stochastic_step_reproducible() {
        let device = Default::default();
        let schedule = NoiseSchedule::sd_inpainting();
        let scheduler = DdimScheduler::new(
            &schedule,
            DdimConfig {
                num_inference_steps: 5,
                eta: 1.0,
            },
        )
        .unwrap();
        assert!(scheduler.step_std(0) > 0.0);

        let sample = Tensor::<TestBackend, 4>::full([1, 4, 4, 4], 0.3, &device);
        let eps = Tensor::<TestBackend, 4>::full([1, 4, 4, 4], 0.1, &device);

        let run = |seed| {
            let mut noise = NoiseGenerator::from_seed(seed);
            to_vec(
                scheduler
                    .step(eps.clone(), 0, sample.clone(), &mut noise)
                    .unwrap(),
            )
        };
        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }

    #[test]
    fn test_step_out_of_range() {
        let device = Default::default();
        let schedule = NoiseSchedule::sd_inpainting();
        let scheduler = DdimScheduler::new(
            &schedule,
            DdimConfig {
                num_inference_steps: 2,
                eta: 0.0,
            },
        )
        .unwrap();
        let sample = Tensor::<TestBackend, 4>::zeros([1, 4, 2, 2], &device);
        let result = scheduler.step(sample.clone(), 2, sample, &mut NoiseGenerator::from_seed(0));
        assert_eq!(
            result.err(),
            Some(ScheduleError::StepOutOfRange { index: 2, len: 2 })
        );
    }
}
